//! Bounded worker pools that run the stage chains.

use shunt_plugin::{Pipeline, RequestContext, ResponseSink, Transport};
use shunt_proto::Message;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// One accepted query, pre-parsed on the event loop.
pub struct Job {
    pub query: Message,
    pub transport: Transport,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub sink: Arc<dyn ResponseSink>,
}

/// A fixed set of workers draining one bounded queue.
///
/// A job runs to completion on its worker: context setup, the query chain,
/// and the SERVFAIL fallback when no stage wrote a response. Dispatch applies
/// backpressure to the event loop when the queue fills instead of growing it.
pub struct WorkerPool {
    jobs: mpsc::Sender<Job>,
}

impl WorkerPool {
    pub fn new(workers: usize, pipeline: Arc<Pipeline>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));

        for _ in 0..workers {
            let rx = rx.clone();
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                loop {
                    let job = rx.lock().await.recv().await;
                    let Some(job) = job else {
                        return;
                    };
                    run_job(&pipeline, job).await;
                }
            });
        }

        Self { jobs: tx }
    }

    /// Enqueues a job, waiting while the queue is full.
    pub async fn dispatch(&self, job: Job) {
        if self.jobs.send(job).await.is_err() {
            debug!("worker pool stopped, dropping query");
        }
    }
}

async fn run_job(pipeline: &Pipeline, job: Job) {
    let mut ctx = RequestContext::new(job.transport, job.local_addr, job.remote_addr, job.sink);
    let mut query = job.query;

    pipeline.handle_query(&mut ctx, &mut query).await;

    if !ctx.response_written {
        let servfail = Message::servfail_for(&query);
        if let Err(err) = crate::write_response(&mut ctx, &servfail).await {
            debug!(error = %err, client = %ctx.remote_addr, "servfail write failed");
        }
    }
}
