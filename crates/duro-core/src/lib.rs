//! Domain logic for duro: dependency graph, config merging, the tree
//! walker, and the reschedule/serve entry points. External systems
//! (schedule store, warehouse, processor sandbox, notifier) are reached
//! only through the capability traits in [`traits`]; this crate names no
//! concrete implementation of any of them.

pub mod checks;
pub mod clock;
pub mod config_merge;
pub mod dot;
pub mod engine;
pub mod error;
pub mod graph;
pub mod interval;
pub mod loader;
pub mod reschedule;
pub mod table;
pub mod telemetry;
pub mod timestamps;
pub mod traits;
pub mod tree;

pub use clock::now_epoch_s;
pub use engine::Engine;
pub use telemetry::init_tracing;
pub use error::{CreationError, CreationResult, SchedulerError, SchedulerResult};
pub use graph::{Graph, NodeData};
pub use reschedule::{build_graph, reschedule, CycleMode, GraphBuild, RescheduleOutcome};
pub use table::Table;
pub use timestamps::{Phase, Timestamps};
pub use traits::{Notifier, NotifyClass, ProcessorRunner, ScheduleStore, TestOutcome, UpsertSummary, WarehouseConn};
pub use tree::TreeWalker;
