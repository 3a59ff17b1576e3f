// 错误处理中间件


use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    rc::Rc,
};
use tracing::{error, info, warn};
use uuid::Uuid;

/// 请求 ID 响应头
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 请求 ID，存放在请求扩展中
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// 错误处理中间件
///
/// 为每个请求分配请求 ID（优先沿用客户端传入的 `X-Request-ID`），
/// 记录耗时和状态，并把请求 ID 写回响应头。
pub struct ErrorHandlerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for ErrorHandlerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ErrorHandlerMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ErrorHandlerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct ErrorHandlerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ErrorHandlerMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            // 从请求头获取或生成请求 ID
            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            req.extensions_mut().insert(RequestId(request_id.clone()));

            // 记录请求开始
            let method = req.method().clone();
            let path = req.path().to_string();
            let start_time = std::time::Instant::now();

            info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                "开始处理请求"
            );

            // 调用下一个服务
            let result = service.call(req).await;

            // 计算处理时间
            let duration = start_time.elapsed();

            match result {
                Ok(mut response) => {
                    let status = response.status();

                    if status.is_success() || status.is_informational() {
                        info!(
                            request_id = %request_id,
                            method = %method,
                            path = %path,
                            status = %status.as_u16(),
                            duration_ms = %duration.as_millis(),
                            "请求处理成功"
                        );
                    } else if status.is_client_error() {
                        warn!(
                            request_id = %request_id,
                            method = %method,
                            path = %path,
                            status = %status.as_u16(),
                            duration_ms = %duration.as_millis(),
                            "客户端错误"
                        );
                    } else {
                        error!(
                            request_id = %request_id,
                            method = %method,
                            path = %path,
                            status = %status.as_u16(),
                            duration_ms = %duration.as_millis(),
                            "服务器错误"
                        );
                    }

                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }

                    Ok(response)
                }
                Err(err) => {
                    error!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        error = %err,
                        duration_ms = %duration.as_millis(),
                        "请求处理失败"
                    );

                    Err(err)
                }
            }
        })
    }
}
