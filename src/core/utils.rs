//! 核心工具函数
//!
//! 锁恢复、随机种子等在各模块间共用的小工具。

use std::sync::{Mutex, MutexGuard};

/// 获取互斥锁，锁中毒时取回内部数据继续使用
///
/// 单个发射器更新任务 panic 不应让整帧停摆。
pub fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 获取当前Unix时间戳（纳秒）
///
/// 用于在未指定种子时初始化随机数
///
/// # 示例
///
/// ```rust
/// use particle_engine::core::utils::current_timestamp_nanos;
///
/// let seed = current_timestamp_nanos() as u64;
/// ```
pub fn current_timestamp_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// 混合两个整数得到新的随机种子（SplitMix64）
///
/// 子发射器按（发射器种子, 序号）派生种子，重复初始化时结果可复现。
pub fn mix_seed(base: u64, salt: u64) -> u64 {
    let mut z = base ^ salt.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lock_recover_after_poison() {
        let shared = Arc::new(Mutex::new(5u32));
        let clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(shared.is_poisoned());
        assert_eq!(*lock_recover(&shared), 5);
    }

    #[test]
    fn test_mix_seed_is_deterministic() {
        assert_eq!(mix_seed(1, 2), mix_seed(1, 2));
        assert_ne!(mix_seed(1, 2), mix_seed(1, 3));
    }
}
