//! 后台更新任务调度
//!
//! 每个发射器每帧最多提交一个“更新全部容器”的任务。渲染前必须调用
//! [`JobHandle::wait`] 同步，这是整个子系统唯一的阻塞点。
//!
//! ## 功能特性
//!
//! - 阻塞任务提交到 tokio 的阻塞线程池
//! - 完成信号经 crossbeam 通道传回
//! - 线程更新关闭或运行时不可用时退化为同步执行

use crate::core::error::{SchedulerError, SchedulerResult};
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// 任务句柄
///
/// 提交返回句柄；任何读取容器粒子状态的调用方都要先 `wait`。
#[derive(Debug)]
pub struct JobHandle<T> {
    /// 任务 ID
    pub id: u64,
    done_rx: Receiver<T>,
    finished: Arc<AtomicBool>,
}

impl<T> JobHandle<T> {
    /// 阻塞直到任务完成并取回结果
    ///
    /// 任务永不被强制中止；发射器死亡时也会先等待其在途任务。
    pub fn wait(self) -> SchedulerResult<T> {
        self.done_rx
            .recv()
            .map_err(|_| SchedulerError::JobDropped(self.id))
    }

    /// 非阻塞查询任务是否已结束，包括 panic 退出的任务
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire) || !self.done_rx.is_empty()
    }
}

/// 任务结束（正常返回或 panic 展开）时递减在途计数并标记完成
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.finished.store(true, Ordering::Release);
    }
}

/// 任务调度器
///
/// # 示例
///
/// ```rust
/// use particle_engine::core::scheduler::JobScheduler;
///
/// let scheduler = JobScheduler::new(2, true).unwrap();
/// let handle = scheduler.submit(|| 6 * 7);
/// assert_eq!(handle.wait().unwrap(), 42);
/// ```
pub struct JobScheduler {
    /// Tokio 运行时，`None` 表示同步模式
    runtime: Option<tokio::runtime::Runtime>,
    next_job_id: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    worker_count: usize,
}

impl JobScheduler {
    /// 创建任务调度器
    ///
    /// # 参数
    /// - `worker_threads`: 工作线程数量，0 表示使用 CPU 核心数
    /// - `threaded`: 为 `false` 时所有任务在提交线程上立即执行
    pub fn new(worker_threads: usize, threaded: bool) -> SchedulerResult<Self> {
        let workers = if worker_threads == 0 {
            num_cpus::get()
        } else {
            worker_threads
        };

        let runtime = if threaded {
            Some(
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(workers)
                    .max_blocking_threads(workers)
                    .thread_name("particle-update")
                    .build()?,
            )
        } else {
            None
        };

        Ok(Self {
            runtime,
            next_job_id: AtomicU64::new(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
            worker_count: workers,
        })
    }

    /// 同步调度器，用于关闭线程更新或运行时创建失败的场合
    pub fn inline() -> Self {
        Self {
            runtime: None,
            next_job_id: AtomicU64::new(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
            worker_count: 1,
        }
    }

    /// 提交阻塞任务
    pub fn submit<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = bounded(1);
        let finished = Arc::new(AtomicBool::new(false));

        match &self.runtime {
            Some(runtime) => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                let guard = InFlightGuard {
                    in_flight: Arc::clone(&self.in_flight),
                    finished: Arc::clone(&finished),
                };
                runtime.spawn_blocking(move || {
                    let done_tx = done_tx;
                    // 计数先于结果发送归还；panic 时发送端随后断开，`wait` 得到 `JobDropped`
                    let result = {
                        let _guard = guard;
                        job()
                    };
                    let _ = done_tx.send(result);
                });
            }
            None => {
                let _ = done_tx.send(job());
                finished.store(true, Ordering::Release);
            }
        }

        JobHandle {
            id,
            done_rx,
            finished,
        }
    }

    /// 是否在后台线程执行
    pub fn is_threaded(&self) -> bool {
        self.runtime.is_some()
    }

    /// 当前在途任务数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 获取工作线程数
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl std::fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobScheduler")
            .field("threaded", &self.is_threaded())
            .field("worker_count", &self.worker_count)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
