// 示例插件
// 演示最小的插件实现

use actix_web::HttpResponse;
use serde_json::json;

use crate::errors::PlugHostError;
use crate::plugins::plugin_interface::{Plugin, PluginMetadata};
use crate::plugins::route_table::{PluginRequest, RouteGroup};

pub struct SamplePlugin {
    metadata: PluginMetadata,
}

impl SamplePlugin {
    pub fn new() -> Self {
        Self {
            metadata: PluginMetadata {
                name: "Sample Plugin".to_string(),
                icon: "\u{f135}".to_string(),
                description: "This is a sample plugin.".to_string(),
                version: "1.0".to_string(),
                author: "Your Name".to_string(),
                ..PluginMetadata::default()
            },
        }
    }
}

impl Default for SamplePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for SamplePlugin {
    fn metadata(&self) -> PluginMetadata {
        self.metadata.clone()
    }

    fn register_routes(&self, routes: &mut RouteGroup) {
        let body = json!({
            "name": self.metadata.name,
            "icon": self.metadata.icon,
            "description": self.metadata.description,
        });
        routes.get("/info", move |_req: PluginRequest| {
            let body = body.clone();
            async move { Ok::<_, PlugHostError>(HttpResponse::Ok().json(body)) }
        });
    }
}
