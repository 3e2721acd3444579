//! 状态变化钩子
//!
//! 发射器创建/删除、子发射器开始/停止（音频触发器）通知外部订阅者。
//! 订阅者的失败不影响模拟，回调内 panic 会被捕获并记录。

use crate::math::Location;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// 发射器概要
#[derive(Debug, Clone, PartialEq)]
pub struct EmitterInfo {
    pub id: u64,
    pub effect: String,
    pub location: Location,
}

/// 音频触发事件
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrigger {
    pub emitter: u64,
    pub effect: String,
    pub trigger: String,
    pub location: Location,
    /// `true` 为开始触发器，`false` 为停止触发器
    pub start: bool,
}

/// 效果事件订阅者
pub trait EffectEventListener: Send + Sync {
    fn on_create_emitter(&self, _info: &EmitterInfo) {}

    fn on_delete_emitter(&self, _info: &EmitterInfo) {}

    fn on_audio_trigger(&self, _event: &AudioTrigger) {}
}

/// 订阅者列表
#[derive(Default)]
pub struct EventHub {
    listeners: RwLock<Vec<Arc<dyn EffectEventListener>>>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn EffectEventListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn EffectEventListener>) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dispatch(&self, what: &str, f: impl Fn(&dyn EffectEventListener)) {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                tracing::warn!(target: "particles", "Event listener panicked during {}", what);
            }
        }
    }

    pub fn emitter_created(&self, info: &EmitterInfo) {
        self.dispatch("emitter create", |l| l.on_create_emitter(info));
    }

    pub fn emitter_deleted(&self, info: &EmitterInfo) {
        self.dispatch("emitter delete", |l| l.on_delete_emitter(info));
    }

    pub fn audio_trigger(&self, event: &AudioTrigger) {
        self.dispatch("audio trigger", |l| l.on_audio_trigger(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        created: AtomicUsize,
        deleted: AtomicUsize,
    }

    impl EffectEventListener for Counter {
        fn on_create_emitter(&self, _info: &EmitterInfo) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }

        fn on_delete_emitter(&self, _info: &EmitterInfo) {
            self.deleted.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicky;

    impl EffectEventListener for Panicky {
        fn on_create_emitter(&self, _info: &EmitterInfo) {
            panic!("listener failure");
        }
    }

    fn info() -> EmitterInfo {
        EmitterInfo {
            id: 1,
            effect: "smoke".to_string(),
            location: Location::IDENTITY,
        }
    }

    #[test]
    fn test_listeners_notified_and_failures_contained() {
        let hub = EventHub::new();
        let counter = Arc::new(Counter::default());
        hub.add_listener(Arc::new(Panicky));
        hub.add_listener(counter.clone());

        hub.emitter_created(&info());
        hub.emitter_deleted(&info());
        assert_eq!(counter.created.load(Ordering::SeqCst), 1);
        assert_eq!(counter.deleted.load(Ordering::SeqCst), 1);

        let as_dyn: Arc<dyn EffectEventListener> = counter;
        assert!(hub.remove_listener(&as_dyn));
        assert_eq!(hub.len(), 1);
    }
}
