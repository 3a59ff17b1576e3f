// 插件路由分发
// 作为插件作用域的默认服务，按运行时路由表转发到插件处理函数

use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use tracing::debug;

use crate::errors::PlugHostError;
use crate::plugins::{PluginManager, PluginRequest, RouteMatch};

/// 分发插件路由请求
pub async fn dispatch_plugin_route(
    req: HttpRequest,
    payload: web::Payload,
    manager: web::Data<PluginManager>,
) -> ActixResult<HttpResponse> {
    let path = req.path().to_string();
    let method = req.method().clone();

    match manager.route_table().resolve(&method, &path).await {
        RouteMatch::Found { handler, params } => {
            debug!(method = %method, path = %path, "分发插件路由");
            let response = handler(PluginRequest::new(req, payload, params)).await?;
            Ok(response)
        }
        RouteMatch::MethodNotAllowed => {
            Err(PlugHostError::method_not_allowed(method.as_str(), path).into())
        }
        RouteMatch::NotFound => Err(PlugHostError::not_found(format!("route:{}", path)).into()),
    }
}
