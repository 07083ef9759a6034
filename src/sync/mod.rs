//! Hand-rolled synchronization primitives.
//!
//! - [`SpinLock`] - cancellable busy-wait mutual exclusion over one atomic
//! - [`FairSemaphore`] - FIFO-fair counting semaphore, one park node per waiter
//! - [`CountingSemaphore`] - unfair counting semaphore on a shared `Condvar`
//! - [`CancelFlag`] - run-wide cancellation signal with interruptible sleep
//! - [`StartGate`] - cancellable entry barrier for worker startup

pub mod cancel;
pub mod counting_semaphore;
pub mod fair_semaphore;
pub mod gate;
pub mod spin_lock;

pub use cancel::CancelFlag;
pub use counting_semaphore::CountingSemaphore;
pub use fair_semaphore::FairSemaphore;
pub use gate::StartGate;
pub use spin_lock::SpinLock;
