//! Remote data source traits and implementations
//!
//! The store reads tickets, threads and read markers through [`DeskSource`].
//! Implementations are synchronous so they can run on any executor; the
//! store moves calls onto blocking threads.

mod memory;
pub mod supabase;
mod traits;

pub use memory::InMemoryDeskSource;
pub use supabase::{PollingChangeFeed, SupabaseClient, SupabaseSource};
pub use traits::{DeskSource, TicketQuery};
