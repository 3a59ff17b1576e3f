// 插件管理器测试

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    use actix_web::http::Method;
    use actix_web::HttpResponse;
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};

    use crate::errors::PlugHostError;
    use crate::plugins::{
        JsonFileSettingsStore, Plugin, PluginManager, PluginMetadata, PluginSettings,
        PluginSource, RouteGroup, RouteMatch, RouteTable, SettingsOverrides, SettingsStore,
    };

    struct TestPlugin {
        metadata: PluginMetadata,
        paths: Vec<&'static str>,
    }

    impl Plugin for TestPlugin {
        fn metadata(&self) -> PluginMetadata {
            self.metadata.clone()
        }

        fn register_routes(&self, routes: &mut RouteGroup) {
            for path in &self.paths {
                routes.get(path, |_req| async { Ok::<_, PlugHostError>(HttpResponse::Ok().finish()) });
            }
        }
    }

    fn source(id: &'static str, position: i64, paths: Vec<&'static str>) -> PluginSource {
        PluginSource::of(id, move || TestPlugin {
            metadata: PluginMetadata {
                name: id.to_string(),
                position,
                ..PluginMetadata::default()
            },
            paths: paths.clone(),
        })
    }

    /// 内存设置存储，可以模拟读写失败
    #[derive(Default)]
    struct MemoryStore {
        records: StdMutex<HashMap<String, SettingsOverrides>>,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        saves: AtomicUsize,
    }

    impl MemoryStore {
        fn with_record(id: &str, record: Value) -> Self {
            let store = Self::default();
            if let Value::Object(map) = record {
                store.records.lock().unwrap().insert(id.to_string(), map);
            }
            store
        }

        fn record(&self, id: &str) -> Option<SettingsOverrides> {
            self.records.lock().unwrap().get(id).cloned()
        }
    }

    #[async_trait]
    impl SettingsStore for MemoryStore {
        async fn load(&self) -> Result<HashMap<String, SettingsOverrides>, PlugHostError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(PlugHostError::storage("读取失败"));
            }
            Ok(self.records.lock().unwrap().clone())
        }

        async fn save(&self, plugin_id: &str, settings: &PluginSettings) -> Result<(), PlugHostError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(PlugHostError::storage("写入失败"));
            }
            let Value::Object(record) = serde_json::to_value(settings).unwrap() else {
                panic!("设置必须序列化为对象");
            };
            self.records
                .lock()
                .unwrap()
                .insert(plugin_id.to_string(), record);
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager(sources: Vec<PluginSource>, store: Arc<MemoryStore>) -> PluginManager {
        PluginManager::new(sources, store, Arc::new(RouteTable::new()), "/plugins")
    }

    async fn is_routed(manager: &PluginManager, path: &str) -> bool {
        matches!(
            manager.route_table().resolve(&Method::GET, path).await,
            RouteMatch::Found { .. }
        )
    }

    #[tokio::test]
    async fn test_disable_then_enable_restores_same_handler() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec!["/ping"])], store);
        manager.reload().await.unwrap();

        let RouteMatch::Found { handler: before, .. } =
            manager.route_table().resolve(&Method::GET, "/plugins/alpha/ping").await
        else {
            panic!("启用的插件应当有路由");
        };

        manager.disable("alpha").await.unwrap();
        assert!(!is_routed(&manager, "/plugins/alpha/ping").await);
        assert_eq!(manager.route_table().handles_for("alpha").await, 0);

        manager.enable("alpha").await.unwrap();
        let RouteMatch::Found { handler: after, .. } =
            manager.route_table().resolve(&Method::GET, "/plugins/alpha/ping").await
        else {
            panic!("重新启用后路由应当恢复");
        };
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(manager.route_table().handles_for("alpha").await, 1);
    }

    #[tokio::test]
    async fn test_list_excludes_disabled_and_sorts_by_position() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(
            vec![
                source("three", 3, vec![]),
                source("last", -1, vec![]),
                source("one", 1, vec![]),
                source("hidden", 2, vec![]),
            ],
            store,
        );
        manager.reload().await.unwrap();
        manager.disable("hidden").await.unwrap();

        let ids: Vec<_> = manager.list().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["one", "three", "last"]);

        // 全部列表保持发现顺序
        let all: Vec<_> = manager.all().await.into_iter().map(|p| p.id).collect();
        assert_eq!(all, vec!["three", "last", "one", "hidden"]);
    }

    #[tokio::test]
    async fn test_update_icon_changes_only_icon() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec!["/ping"])], store.clone());
        manager.reload().await.unwrap();
        let before = manager.get("alpha").await.unwrap();

        let info = manager
            .update_attribute("alpha", "icon", json!("\u{f0e7}"))
            .await
            .unwrap();

        assert_eq!(info.icon, "\u{f0e7}");
        assert_eq!(info.name, before.name);
        assert_eq!(info.enabled, before.enabled);
        assert_eq!(info.position, before.position);
        assert!(is_routed(&manager, "/plugins/alpha/ping").await);

        let record = store.record("alpha").unwrap();
        assert_eq!(record["icon"], json!("\u{f0e7}"));
        assert_eq!(record["enabled"], json!(true));
    }

    #[tokio::test]
    async fn test_unknown_attribute_leaves_state_untouched() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec![])], store.clone());
        manager.reload().await.unwrap();
        let before = manager.get("alpha").await.unwrap();

        let mut attributes = Map::new();
        attributes.insert("icon".to_string(), json!("x"));
        attributes.insert("color".to_string(), json!("red"));
        let err = manager.update_attributes("alpha", &attributes).await.unwrap_err();

        assert!(matches!(err, PlugHostError::InvalidAttribute { ref attribute } if attribute == "color"));
        assert_eq!(manager.get("alpha").await.unwrap(), before);
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wrong_value_type_is_validation_error() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec![])], store.clone());
        manager.reload().await.unwrap();

        let err = manager
            .update_attribute("alpha", "enabled", json!("yes"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlugHostError::Validation { .. }));
        assert!(manager.get("alpha").await.unwrap().enabled);
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_not_found() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec![])], store);
        manager.reload().await.unwrap();

        assert!(matches!(
            manager.enable("ghost").await,
            Err(PlugHostError::NotFound { .. })
        ));
        // 插件不存在优先于属性名错误
        assert!(matches!(
            manager.update_attribute("ghost", "color", json!(1)).await,
            Err(PlugHostError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_update_does_not_persist() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec![])], store.clone());
        manager.reload().await.unwrap();

        let info = manager.update_attributes("alpha", &Map::new()).await.unwrap();
        assert_eq!(info.id, "alpha");
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_persisted_disable_wins_on_reload() {
        let store = Arc::new(MemoryStore::with_record(
            "alpha",
            json!({ "enabled": false, "position": 7 }),
        ));
        let manager = manager(vec![source("alpha", 1, vec!["/ping"])], store);
        let summary = manager.reload().await.unwrap();

        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.mounted, 0);
        let info = manager.get("alpha").await.unwrap();
        assert!(!info.enabled);
        assert_eq!(info.position, 7);
        assert!(!is_routed(&manager, "/plugins/alpha/ping").await);
        assert!(manager.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_settings_survive_manager_restart() {
        let store = Arc::new(MemoryStore::default());
        let first = manager(vec![source("alpha", 1, vec!["/ping"])], store.clone());
        first.reload().await.unwrap();
        first.set_position("alpha", 9).await.unwrap();
        first.disable("alpha").await.unwrap();

        let second = manager(vec![source("alpha", 1, vec!["/ping"])], store);
        second.reload().await.unwrap();
        let info = second.get("alpha").await.unwrap();
        assert_eq!(info.position, 9);
        assert!(!info.enabled);
    }

    #[tokio::test]
    async fn test_concurrent_enable_mounts_once() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec!["/ping"])], store);
        manager.reload().await.unwrap();
        manager.disable("alpha").await.unwrap();

        let (a, b) = tokio::join!(manager.enable("alpha"), manager.enable("alpha"));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(manager.route_table().handles_for("alpha").await, 1);
        assert_eq!(manager.route_table().route_count().await, 1);
    }

    #[tokio::test]
    async fn test_broken_sources_are_skipped() {
        let store = Arc::new(MemoryStore::default());
        let sources = vec![
            source("alpha", 1, vec!["/ping"]),
            PluginSource::new("broken", || Err(PlugHostError::internal("构造失败"))),
            source("alpha", 2, vec!["/other"]),
            source("bad_route", 3, vec!["no-leading-slash"]),
            source("beta", 4, vec!["/ping"]),
        ];
        let manager = manager(sources, store);
        let summary = manager.reload().await.unwrap();

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.mounted, 2);
        let ids: Vec<_> = manager.all().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert!(is_routed(&manager, "/plugins/beta/ping").await);
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec!["/ping"])], store.clone());
        manager.reload().await.unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = manager.disable("alpha").await.unwrap_err();
        assert!(matches!(err, PlugHostError::Storage { .. }));

        assert!(manager.get("alpha").await.unwrap().enabled);
        assert!(is_routed(&manager, "/plugins/alpha/ping").await);
        assert_eq!(manager.route_table().handles_for("alpha").await, 1);
    }

    #[tokio::test]
    async fn test_reload_keeps_registry_when_store_unreadable() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec!["/ping"])], store.clone());
        manager.reload().await.unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        assert!(matches!(
            manager.reload().await,
            Err(PlugHostError::Storage { .. })
        ));

        assert_eq!(manager.all().await.len(), 1);
        assert!(is_routed(&manager, "/plugins/alpha/ping").await);
    }

    #[tokio::test]
    async fn test_reload_remounts_without_duplicates() {
        let store = Arc::new(MemoryStore::default());
        let manager = manager(vec![source("alpha", 1, vec!["/ping", "/pong"])], store);
        manager.reload().await.unwrap();
        manager.reload().await.unwrap();

        assert_eq!(manager.route_table().handles_for("alpha").await, 1);
        assert_eq!(manager.route_table().route_count().await, 2);
    }

    #[tokio::test]
    async fn test_missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("plugins_settings.json");
        let store = Arc::new(JsonFileSettingsStore::new(&path));
        assert!(store.load().await.unwrap().is_empty());

        let manager = PluginManager::new(
            vec![source("alpha", 1, vec![])],
            store,
            Arc::new(RouteTable::new()),
            "/plugins",
        );
        manager.reload().await.unwrap();
        manager.set_position("alpha", 5).await.unwrap();

        // 第一次保存时创建文件
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["alpha"]["position"], json!(5));
    }
}
