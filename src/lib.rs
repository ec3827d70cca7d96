//! dkrcache - memoize expensive tasks in the docker build cache
//!
//! A task runs at most once per (context directory content, discriminator).
//! Its outcome, value or error, is stored as a layer in the local builder's
//! cache and replayed on later runs without executing the task again.
//!
//! ```no_run
//! # async fn demo() -> dkrcache::DkrResult<()> {
//! let task = dkrcache::ExpensiveTask::load("assets", "v1", || async {
//!     Ok::<_, String>(42u32)
//! })
//! .await?;
//! assert_eq!(task.run().await?, Ok(42));
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod listener;
pub mod orchestration;
pub mod outcome;
pub mod task;

pub use error::{DkrError, DkrResult};
pub use outcome::{policy, Outcome};
pub use task::ExpensiveTask;
