//! Two-queue sync scheduler coordinating peer-pull file and meta-file
//! ingestion. Ported from `SLNSync.c`'s `async_sem_t`-based queue pair
//! onto `tokio::sync::Semaphore`, which gives the same acquire/release
//! counting without the original's manual wait-list bookkeeping. The
//! queue/semaphore mechanics here are spec-exact (`spec.md` §4.8); the
//! peer-transport side of sync — dialing a remote, negotiating which
//! URIs it offers, the `FileAvailable`/Meta-map-draining availability
//! decision — has no client anywhere in this crate and is out of scope,
//! per `spec.md`'s own "OUT OF SCOPE (external collaborators)" list.
//! What runs here is the scheduler's producer/consumer handoff, fed by
//! every locally committed submission and drained by a background task
//! (`http::server::run`) that just acknowledges each item, since there
//! is no peer push to perform on the other end of `WorkDone`.

use crate::error::{SlnError, SlnResult};
use crate::ids::FileId;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// One unit of sync work: a committed file (or meta-file) awaiting
/// hand-off to the consumer side of the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkItem {
    pub file_id: FileId,
    pub is_meta: bool,
}

/// `ingest` starts at 1 and acts as a mutex over `sub`, not a work
/// counter: a producer must wait for the prior submission's `done`
/// before the next can occupy the slot, giving the "only one outstanding
/// submission per queue" invariant `spec.md` §4.8 calls for.
struct Queue {
    sub: Mutex<Option<WorkItem>>,
    ingest: Semaphore,
    work: Semaphore,
    done: Semaphore,
}

impl Queue {
    fn new() -> Self {
        Queue {
            sub: Mutex::new(None),
            ingest: Semaphore::new(1),
            work: Semaphore::new(0),
            done: Semaphore::new(0),
        }
    }
}

/// Coordinates peer-pull ingestion across `fileq` and `metaq`. `shared`
/// signals the consumer that one of the two queues has work; it is
/// posted exactly once per producer post, so a consumer woken by it that
/// finds neither queue's `work` permit available indicates the protocol
/// was violated elsewhere, not a spurious wakeup.
pub struct SyncQueue {
    fileq: Queue,
    metaq: Queue,
    shared: Semaphore,
}

impl SyncQueue {
    pub fn new() -> Arc<SyncQueue> {
        Arc::new(SyncQueue {
            fileq: Queue::new(),
            metaq: Queue::new(),
            shared: Semaphore::new(0),
        })
    }

    /// Producer protocol for one URI to ingest (`spec.md` §4.8): wait
    /// for the queue's single slot, post the item, then block until the
    /// consumer reports `WorkDone` before releasing the slot. Callers
    /// that can't afford to block on the consumer — an HTTP request
    /// handler committing a batch, say — should run this in a detached
    /// task rather than await it inline.
    pub async fn producer_ingest(&self, item: WorkItem) {
        let queue = if item.is_meta { &self.metaq } else { &self.fileq };

        let ingest_permit = queue.ingest.acquire().await.expect("semaphore never closed");
        ingest_permit.forget();

        *queue.sub.lock().await = Some(item);
        queue.work.add_permits(1);
        self.shared.add_permits(1);

        let done_permit = queue.done.acquire().await.expect("semaphore never closed");
        done_permit.forget();
        queue.ingest.add_permits(1);
    }

    /// Consumer protocol: `shared.wait()`, then try `fileq` before
    /// `metaq`. Exactly one of the two must have work, since `shared` is
    /// posted iff one of them was; the `Panic` kind models the fatal
    /// invariant-violation escalation `spec.md` §4.8 calls for without a
    /// literal process-crashing `panic!`.
    pub async fn consumer_claim(self: &Arc<Self>) -> SlnResult<Claimed> {
        let shared_permit = self.shared.acquire().await.expect("semaphore never closed");
        shared_permit.forget();

        if let Ok(permit) = self.fileq.work.try_acquire() {
            permit.forget();
            let item = self.fileq.sub.lock().await.take().expect("work permit guarantees a posted item");
            return Ok(Claimed { queue: self.clone(), is_meta: false, item });
        }
        if let Ok(permit) = self.metaq.work.try_acquire() {
            permit.forget();
            let item = self.metaq.sub.lock().await.take().expect("work permit guarantees a posted item");
            return Ok(Claimed { queue: self.clone(), is_meta: true, item });
        }
        Err(SlnError::Panic("shared semaphore woke a consumer but neither queue had posted work".into()))
    }

    fn work_done(&self, is_meta: bool) {
        let queue = if is_meta { &self.metaq } else { &self.fileq };
        queue.done.add_permits(1);
    }
}

/// An item claimed by a consumer. `finish` runs `WorkDone`: it posts the
/// matching queue's `done` semaphore, waking the producer blocked on
/// `done.wait()`, which then releases the queue's `ingest` slot for the
/// next submission.
pub struct Claimed {
    queue: Arc<SyncQueue>,
    is_meta: bool,
    pub item: WorkItem,
}

impl Claimed {
    pub fn finish(self) {
        self.queue.work_done(self.is_meta);
    }
}
