//! 状态管理器集成测试：持久化后端、watch、快照窗口

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use quill::core::{AgentError, SeedFile, StateConfig, StateManager};
    use quill::memory::Role;
    use quill::storage::{MemoryStorage, SqliteStorage, StateStorage};
    use quill::vfs::{FileChange, FilePattern};

    #[test]
    fn test_sqlite_round_trip_across_managers() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");

        {
            let mut m = StateManager::new(
                Box::new(SqliteStorage::open(&db, "s1").unwrap()),
                StateConfig::default(),
            );
            m.initialize(Some(vec![SeedFile::new("/index.ts", "export {}")])).unwrap();
            m.mutate_files(&[FileChange::create("/lib/a.ts", "export const a = 1;")]).unwrap();
            m.append_message(Role::User, "hi").unwrap();
        }

        let mut other_session = StateManager::new(
            Box::new(SqliteStorage::open(&db, "s2").unwrap()),
            StateConfig::default(),
        );
        other_session.initialize(None).unwrap();
        assert!(other_session.files().is_empty());

        let mut m = StateManager::new(Box::new(SqliteStorage::open(&db, "s1").unwrap()), StateConfig::default());
        m.initialize(None).unwrap();
        assert_eq!(m.version(), 2);
        assert_eq!(m.files().len(), 2);
        assert_eq!(m.messages()[0].content, "hi");
        assert_eq!(m.file("/lib/a.ts").unwrap().language.as_deref(), Some("typescript"));
    }

    #[test]
    fn test_watch_sees_saves_from_another_handle() {
        let storage = MemoryStorage::new();
        let m = StateManager::new(Box::new(storage.clone()), StateConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = m
            .watch_storage(Arc::new(move |_state| {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        let mut writer = StateManager::new(Box::new(storage.clone()), StateConfig::default());
        writer.initialize(Some(vec![SeedFile::new("/a.ts", "a")])).unwrap();
        writer.mutate_files(&[FileChange::update("/a.ts", "b")]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        sub.unsubscribe();
        writer.mutate_files(&[FileChange::update("/a.ts", "c")]).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_sqlite_has_no_watch() {
        let m = StateManager::new(Box::new(SqliteStorage::in_memory("x").unwrap()), StateConfig::default());
        assert!(m.watch_storage(Arc::new(|_| {})).is_none());
    }

    #[test]
    fn test_rollback_outside_window() {
        let mut m = StateManager::new(Box::new(MemoryStorage::new()), StateConfig::default());
        m.initialize(None).unwrap();
        for i in 0..19 {
            m.mutate_files(&[FileChange::create(format!("/f{}.ts", i), "x")]).unwrap();
            m.snapshot();
        }
        // 版本 2..=20 各有一个快照，只保留最近 10 个
        let retained: Vec<u64> = m.snapshots().map(|s| s.version).collect();
        assert_eq!(retained, (11..=20).collect::<Vec<u64>>());
        assert!(!m.rollback(7).unwrap());
        assert_eq!(m.version(), 20);
        assert!(m.rollback(15).unwrap());
        assert_eq!(m.files().len(), 14);
    }

    #[test]
    fn test_transaction_restores_byte_identical_state() {
        let storage = MemoryStorage::new();
        let mut m = StateManager::new(Box::new(storage.clone()), StateConfig::default());
        m.initialize(Some(vec![SeedFile::new("/a.ts", "a"), SeedFile::new("/b.ts", "b")])).unwrap();
        let before = serde_json::to_string(m.state()).unwrap();

        let err = m
            .run_transaction(|tx| {
                tx.mutate_files(&[FileChange::delete("/a.ts"), FileChange::update("/b.ts", "bb")])?;
                Err::<(), _>(AgentError::FileNotFound("/c.ts".into()))
            })
            .unwrap_err();
        assert!(matches!(err, AgentError::FileNotFound(_)));
        assert_eq!(serde_json::to_string(m.state()).unwrap(), before);

        // 恢复后的状态写回存储，重启后看不到事务内的中间结果
        assert_eq!(storage.load().unwrap().unwrap().version, 1);
        let mut restarted = StateManager::new(Box::new(storage.clone()), StateConfig::default());
        restarted.initialize(None).unwrap();
        assert_eq!(restarted.file("/a.ts").unwrap().content, "a");
        assert_eq!(restarted.file("/b.ts").unwrap().content, "b");
        assert_eq!(serde_json::to_string(restarted.state()).unwrap(), before);
    }

    #[test]
    fn test_aborted_update_not_loaded_after_restart() {
        let storage = MemoryStorage::new();
        let mut m = StateManager::new(Box::new(storage.clone()), StateConfig::default());
        m.initialize(Some(vec![SeedFile::new("/a.ts", "a")])).unwrap();

        let result: Result<(), AgentError> = m.run_transaction(|tx| {
            tx.mutate_files(&[FileChange::update("/a.ts", "ABORTED")])?;
            Err(AgentError::Cancelled)
        });
        assert!(result.is_err());

        let mut restarted = StateManager::new(Box::new(storage), StateConfig::default());
        restarted.initialize(None).unwrap();
        assert_eq!(restarted.version(), 1);
        assert_eq!(restarted.file("/a.ts").unwrap().content, "a");
    }

    #[test]
    fn test_find_files_by_pattern() {
        let mut m = StateManager::new(Box::new(MemoryStorage::new()), StateConfig::default());
        m.initialize(Some(vec![
            SeedFile::new("/src/a.ts", ""),
            SeedFile::new("/src/deep/b.ts", ""),
            SeedFile::new("/README.md", ""),
        ]))
        .unwrap();

        let glob: FilePattern = "/src/*.ts".parse().unwrap();
        let hits: Vec<String> = m.vfs().find_by_pattern(&glob).into_iter().map(|f| f.path).collect();
        assert_eq!(hits, vec!["/src/a.ts"]);

        let re: FilePattern = r"re:\.md$".parse().unwrap();
        assert_eq!(m.vfs().find_by_pattern(&re).len(), 1);
    }
}
