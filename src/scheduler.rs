use futures::Future;

pub struct Scheduler {
    join_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            join_handles: Vec::new(),
        }
    }

    pub fn run<F, R>(&mut self, interval: std::time::Duration, mut task: F)
    where
        F: FnMut() -> R + Send + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let future = async move {
            let mut interval = tokio::time::interval(interval);
            loop {
                interval.tick().await;
                task().await;
            }
        };
        self.join_handles.push(tokio::task::spawn(future));
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        for handle in &self.join_handles {
            handle.abort();
        }
    }
}
