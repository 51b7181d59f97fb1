//! The Worker Pool (`spec.md` §4.11 "Worker Pool (C11)").
//!
//! Rayon-backed: a dedicated `rayon::ThreadPool` stands in for a pool of
//! worker processes/threads, the same role `rayon` plays for the teacher's
//! own parallel glyph/path work. Only image tasks are ever fanned out
//! (`spec.md` §4.9 step 4); content streams stay single-threaded because
//! their graphics state carries over from one stream to the next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::color::{DestinationColorSpace, PdfColorSpaceKind};
use crate::converter::content_stream::ColorSpaceState;
use crate::converter::image::{ImageInput, ImageOutput};
use crate::engine::intent::RenderingIntent;
use crate::error::{Error, Result};

/// `spec.md` §4.11 "shared-config ... one-time per worker: destination
/// profile, intermediate profiles, intent, BPC, output color space".
#[derive(Debug, Clone)]
pub struct SharedWorkerConfig {
    pub destination_profile: Option<Vec<u8>>,
    pub intermediate_profiles: Vec<String>,
    pub rendering_intent: RenderingIntent,
    pub bits_per_component: u32,
    pub destination_color_space: DestinationColorSpace,
}

/// One unit of work dispatched to the pool (`spec.md` §4.11 "Task message
/// variants").
pub enum TaskMessage {
    Init,
    SharedConfig(SharedWorkerConfig),
    DiagnosticsPort { parent_span_id: Option<u64> },
    Image(ImageInput),
    ContentStream {
        data: Vec<u8>,
        color_spaces: Vec<(String, PdfColorSpaceKind)>,
        initial_state: ColorSpaceState,
    },
    Transform { source_profile: Vec<u8>, destination_profile: Vec<u8> },
    Benchmark,
}

pub enum TaskOutput {
    Ack,
    Image(ImageOutput),
    ContentStream { data: Vec<u8>, final_state: ColorSpaceState },
    Transform(Vec<u8>),
    Benchmark(Duration),
}

/// `spec.md` §4.11: "Results carry the same taskId, a success boolean, and
/// either the typed output buffer ... or an error string."
pub struct TaskResult {
    pub task_id: u64,
    pub success: bool,
    pub output: Option<TaskOutput>,
    pub error: Option<String>,
}

impl TaskResult {
    fn ok(task_id: u64, output: TaskOutput) -> Self {
        Self {
            task_id,
            success: true,
            output: Some(output),
            error: None,
        }
    }

    fn err(task_id: u64, error: Error) -> Self {
        Self {
            task_id,
            success: false,
            output: None,
            error: Some(error.to_string()),
        }
    }
}

/// A pool of image-conversion workers.
///
/// Each task carries a monotonically-increasing `taskId`
/// (`spec.md` §4.11). Tasks submitted together via
/// [`WorkerPool::submit_image_tasks`] are dispatched across the pool's
/// threads and run concurrently with no ordering guarantee between them
/// (`spec.md` §5 "Image conversions within a page have no ordering
/// requirement"); the "arrival order within one worker" guarantee the spec
/// describes for a literal process-pool transport collapses to rayon's own
/// per-task independence here, since each image task is processed in full
/// by whichever thread picks it up.
pub struct WorkerPool {
    pool: ThreadPool,
    next_task_id: AtomicU64,
    shared_config: Option<SharedWorkerConfig>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_count.max(1))
            .build()
            .map_err(|e| Error::WorkerFailed(format!("failed to start worker pool: {e}")))?;
        Ok(Self {
            pool,
            next_task_id: AtomicU64::new(0),
            shared_config: None,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn next_id(&self) -> u64 {
        self.next_task_id.fetch_add(1, Ordering::SeqCst)
    }

    /// `spec.md` §4.11 "shared-config" task: distributed once to avoid
    /// re-sending per-task fields every image.
    pub fn set_shared_config(&mut self, config: SharedWorkerConfig) {
        self.shared_config = Some(config);
    }

    pub fn shared_config(&self) -> Option<&SharedWorkerConfig> {
        self.shared_config.as_ref()
    }

    /// `spec.md` §4.9 step 4(b): "dispatch to workers: prepare tasks,
    /// submit in parallel, await." `spec.md` §4.11: "The Page Coordinator
    /// uses `Promise.all`-style fan-in on image tasks only."
    ///
    /// `convert` runs one image task to completion; it is called from
    /// whichever pool thread rayon assigns the task to. Indexed images are
    /// never submitted here (`spec.md` §4.9 step 4: "Indexed images are
    /// always processed on-thread").
    pub fn submit_image_tasks<F>(&self, inputs: Vec<ImageInput>, convert: F) -> Vec<TaskResult>
    where
        F: Fn(ImageInput) -> Result<ImageOutput> + Sync,
    {
        let assigned: Vec<(u64, ImageInput)> = inputs.into_iter().map(|input| (self.next_id(), input)).collect();

        self.pool.install(|| {
            assigned
                .into_par_iter()
                .map(|(task_id, input)| match convert(input) {
                    Ok(output) => TaskResult::ok(task_id, TaskOutput::Image(output)),
                    Err(e) => TaskResult::err(task_id, e),
                })
                .collect()
        })
    }

    /// `spec.md` §4.11 "transform" task: used for benchmarking or tooling,
    /// not part of the page conversion path proper.
    pub fn submit_transform_task<F>(&self, source_profile: Vec<u8>, destination_profile: Vec<u8>, run: F) -> TaskResult
    where
        F: FnOnce(&[u8], &[u8]) -> Result<Vec<u8>>,
    {
        let task_id = self.next_id();
        match run(&source_profile, &destination_profile) {
            Ok(bytes) => TaskResult::ok(task_id, TaskOutput::Transform(bytes)),
            Err(e) => TaskResult::err(task_id, e),
        }
    }

    /// `spec.md` §4.11 "Cancellation: not supported mid-task; the pool
    /// drains on shutdown." Dropping the pool blocks until every in-flight
    /// task finishes, which is rayon's own `ThreadPool::drop` behavior;
    /// this method exists purely to name the step in the orchestration
    /// call sequence.
    pub fn shutdown(self) {
        drop(self);
    }
}
