//! 会话租约
//!
//! 同一个会话标识同一时间只允许一条生成流程运行。
//! 租约在流程进入终态时释放，流程被丢弃（drop）时也会自动释放。

use std::collections::HashSet;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::PipelineError;

/// 活跃会话登记表（可跨任务共享）
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取租约；同一标识已被占用时返回 `SessionBusy`
    pub fn acquire(&self, session_id: &str) -> Result<SessionLease, PipelineError> {
        let mut active = self.lock();
        if !active.insert(session_id.to_string()) {
            return Err(PipelineError::SessionBusy {
                session_id: session_id.to_string(),
            });
        }
        debug!("🔒 会话 {} 获取租约", session_id);
        Ok(SessionLease {
            session_id: session_id.to_string(),
            registry: self.clone(),
        })
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().contains(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, session_id: &str) {
        if self.lock().remove(session_id) {
            debug!("🔓 会话 {} 释放租约", session_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // 持锁期间不会 panic，中毒时直接取回数据
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 会话租约（RAII）
#[derive(Debug)]
pub struct SessionLease {
    session_id: String,
    registry: SessionRegistry,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.release(&self.session_id);
    }
}

impl Display for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[会话 {}]", self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let registry = SessionRegistry::new();
        let lease = registry.acquire("espresso").unwrap();
        assert_eq!(lease.session_id(), "espresso");

        assert_eq!(
            registry.acquire("espresso").unwrap_err(),
            PipelineError::SessionBusy {
                session_id: "espresso".to_string()
            }
        );
        // 不同会话互不影响
        let other = registry.acquire("latte").unwrap();
        assert_eq!(registry.active_count(), 2);
        drop(other);
    }

    #[test]
    fn test_drop_releases_lease() {
        let registry = SessionRegistry::new();
        {
            let _lease = registry.acquire("espresso").unwrap();
            assert!(registry.is_active("espresso"));
        }
        assert!(!registry.is_active("espresso"));
        assert!(registry.acquire("espresso").is_ok());
    }

    #[test]
    fn test_registry_shared_across_threads() {
        let registry = SessionRegistry::new();
        let lease = registry.acquire("espresso").unwrap();

        let cloned = registry.clone();
        let busy = std::thread::spawn(move || cloned.acquire("espresso").is_err())
            .join()
            .unwrap();
        assert!(busy);
        drop(lease);
        assert_eq!(registry.active_count(), 0);
    }
}
