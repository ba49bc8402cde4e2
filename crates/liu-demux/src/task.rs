//! 协作式后台任务.
//!
//! 每个任务拥有一个工作线程, 反复执行同一个作业闭包. 闭包返回下一次执行前的等待时长,
//! 由任务在可中断的条件变量上等待, 暂停/停止可随时唤醒.
//!
//! - `pause` 等待正在执行的一轮作业结束后返回 (在工作线程内调用时不等待)
//! - `stop` 结束工作线程并回收 (在工作线程内调用时不回收)
//! - `*_async` 版本只改变状态, 不等待

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use liu_core::LiuResult;
use log::{debug, warn};

/// 作业闭包: 执行一轮并返回下一轮之前的等待时长
///
/// 参数是所属任务的句柄, 作业可借此暂停或停止自身.
pub type Job = Box<dyn FnMut(&TaskHandle) -> Duration + Send>;

/// 任务运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Stopped,
    Running,
    Paused,
}

#[derive(Debug)]
struct Control {
    state: TaskState,
    /// 工作线程是否正在执行作业
    in_job: bool,
    /// 每次新建工作线程递增, 旧线程据此退出
    generation: u64,
    worker: Option<ThreadId>,
}

struct Shared {
    name: String,
    control: Mutex<Control>,
    cond: Condvar,
    job: Mutex<Job>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pause_async(&self) {
        let mut ctl = self.lock();
        if ctl.state == TaskState::Running {
            ctl.state = TaskState::Paused;
            self.cond.notify_all();
        }
    }

    fn stop_async(&self) {
        self.lock().state = TaskState::Stopped;
        self.cond.notify_all();
    }
}

/// 协作式后台任务
pub struct Task {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Task {
    /// 创建任务, 此时不启动线程
    pub fn new(name: impl Into<String>, job: Job) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                control: Mutex::new(Control {
                    state: TaskState::Stopped,
                    in_job: false,
                    generation: 0,
                    worker: None,
                }),
                cond: Condvar::new(),
                job: Mutex::new(job),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> TaskState {
        self.shared.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    /// 启动或从暂停中恢复
    pub fn start(&self) -> LiuResult<()> {
        let mut ctl = self.shared.lock();
        match ctl.state {
            TaskState::Running => return Ok(()),
            TaskState::Paused => {
                ctl.state = TaskState::Running;
                self.shared.cond.notify_all();
                return Ok(());
            }
            TaskState::Stopped => {}
        }
        ctl.generation += 1;
        ctl.state = TaskState::Running;
        let generation = ctl.generation;
        drop(ctl);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || worker_loop(shared, generation));
        match spawned {
            Ok(handle) => {
                let old = self
                    .handle
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .replace(handle);
                // 旧线程 (stop_async 之后未回收) 会因代数变化自行退出
                drop(old);
                debug!("任务 {} 已启动", self.shared.name);
                Ok(())
            }
            Err(e) => {
                self.shared.lock().state = TaskState::Stopped;
                warn!("任务 {} 启动失败: {}", self.shared.name, e);
                Err(e.into())
            }
        }
    }

    /// 暂停, 并等待正在执行的一轮作业结束
    pub fn pause(&self) {
        let mut ctl = self.shared.lock();
        if ctl.state != TaskState::Running {
            return;
        }
        ctl.state = TaskState::Paused;
        self.shared.cond.notify_all();
        if ctl.worker == Some(thread::current().id()) {
            return;
        }
        while ctl.in_job && ctl.state == TaskState::Paused {
            ctl = self
                .shared
                .cond
                .wait(ctl)
                .unwrap_or_else(|e| e.into_inner());
        }
        debug!("任务 {} 已暂停", self.shared.name);
    }

    /// 暂停但不等待
    pub fn pause_async(&self) {
        self.shared.pause_async();
    }

    /// 获取任务句柄
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// 停止并回收工作线程
    pub fn stop(&self) {
        let on_worker = {
            let mut ctl = self.shared.lock();
            ctl.state = TaskState::Stopped;
            self.shared.cond.notify_all();
            ctl.worker == Some(thread::current().id())
        };
        if on_worker {
            return;
        }
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("任务 {} 的工作线程异常退出", self.shared.name);
            }
            debug!("任务 {} 已停止", self.shared.name);
        }
    }

    /// 停止但不等待工作线程退出
    pub fn stop_async(&self) {
        self.shared.stop_async();
    }
}

/// 任务句柄, 只能改变状态而不等待
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<Shared>,
}

impl TaskHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> TaskState {
        self.shared.lock().state
    }

    pub fn pause_async(&self) {
        self.shared.pause_async();
    }

    pub fn stop_async(&self) {
        self.shared.stop_async();
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>, generation: u64) {
    shared.lock().worker = Some(thread::current().id());
    let handle = TaskHandle {
        shared: Arc::clone(&shared),
    };
    loop {
        {
            let mut ctl = shared.lock();
            loop {
                if ctl.generation != generation || ctl.state == TaskState::Stopped {
                    return;
                }
                if ctl.state == TaskState::Running {
                    break;
                }
                ctl = shared.cond.wait(ctl).unwrap_or_else(|e| e.into_inner());
            }
            ctl.in_job = true;
        }

        let delay = {
            let mut job = shared.job.lock().unwrap_or_else(|e| e.into_inner());
            (*job)(&handle)
        };

        let mut ctl = shared.lock();
        ctl.in_job = false;
        shared.cond.notify_all();
        if !delay.is_zero() {
            let _ = shared
                .cond
                .wait_timeout_while(ctl, delay, |c| {
                    c.generation == generation && c.state == TaskState::Running
                })
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(counter: Arc<AtomicUsize>, delay: Duration) -> Task {
        Task::new(
            "test-task",
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                delay
            }),
        )
    }

    fn wait_until(cond: impl Fn() -> bool) {
        for _ in 0..500 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("等待超时");
    }

    #[test]
    fn test_启动_暂停_恢复_停止() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Arc::clone(&counter), Duration::from_millis(1));
        assert_eq!(task.state(), TaskState::Stopped);

        task.start().unwrap();
        wait_until(|| counter.load(Ordering::SeqCst) > 3);

        task.pause();
        assert_eq!(task.state(), TaskState::Paused);
        let frozen = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), frozen);

        task.start().unwrap();
        wait_until(|| counter.load(Ordering::SeqCst) > frozen);

        task.stop();
        assert_eq!(task.state(), TaskState::Stopped);
    }

    #[test]
    fn test_停止后可再次启动() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Arc::clone(&counter), Duration::from_millis(1));
        task.start().unwrap();
        wait_until(|| counter.load(Ordering::SeqCst) > 0);
        task.stop_async();
        task.start().unwrap();
        let seen = counter.load(Ordering::SeqCst);
        wait_until(|| counter.load(Ordering::SeqCst) > seen);
        task.stop();
    }

    #[test]
    fn test_作业可停止自身() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let task = Task::new(
            "self-stop",
            Box::new(move |handle| {
                if c.fetch_add(1, Ordering::SeqCst) == 2 {
                    handle.stop_async();
                }
                Duration::ZERO
            }),
        );
        task.start().unwrap();
        wait_until(|| task.state() == TaskState::Stopped);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_长等待可被停止打断() {
        let counter = Arc::new(AtomicUsize::new(0));
        let task = counting_task(Arc::clone(&counter), Duration::from_secs(60));
        task.start().unwrap();
        wait_until(|| counter.load(Ordering::SeqCst) == 1);
        let begin = std::time::Instant::now();
        task.stop();
        assert!(begin.elapsed() < Duration::from_secs(5));
    }
}
