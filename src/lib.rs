//! # Trueno-Lab: Experiment Laboratory with Cell-Level Provenance
//!
//! **Version**: 0.1.0
//!
//! Trueno-Lab runs parameterized experiments under a sequential,
//! timeout-aware assistant, and answers "where does this value come from"
//! for any derived table cell or claim by walking back to the experiment
//! parameters that produced it.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: A hung experiment is killed on timeout; it never stalls the queue
//! - **Poka-Yoke safety**: Inputs are write-once; factories hand out one experiment per point
//! - **Genchi Genbutsu**: Every cell carries a pointer to the data it came from
//! - **Muda elimination**: Explanation graphs are hash-consed, each piece expanded once
//!
//! ## Example Usage
//!
//! ```rust
//! use trueno_lab::experiment::{Experiment, ExperimentFactory};
//! use trueno_lab::provenance::PartRef;
//! use trueno_lab::region::Region;
//! use trueno_lab::table::{ColumnSum, ExperimentTable, TableTransformation};
//! use trueno_lab::Laboratory;
//!
//! let lab = Laboratory::builder().build()?;
//! lab.register_factory(ExperimentFactory::new("square").with_default_builder(|id| {
//!     Ok(Experiment::from_fn(id, |ctx| {
//!         let n = ctx.read_i64("n");
//!         ctx.write("sq", n * n)?;
//!         Ok(())
//!     }))
//! }));
//!
//! let runs = lab.get_experiments("square", &Region::new().add("n", [1, 2, 3]))?;
//! lab.queue(runs.iter().cloned());
//! lab.assistant().run()?;
//!
//! let raw = lab.add_table(ExperimentTable::new(["n", "sq"]).add_all(&runs).to_table());
//! let total = ColumnSum::new().transform(&[lab.table(raw).unwrap().as_ref()])?;
//! let total = lab.add_table(total);
//!
//! // The sum of squares is explained by the three `sq` outputs
//! let graph = lab.explain(&PartRef::cell(total, 0, 1));
//! assert_eq!(graph.leaf_parts().len(), 3);
//! # Ok::<(), trueno_lab::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod claim;
pub mod config;
pub mod error;
pub mod experiment;
pub mod lab;
pub mod logging;
pub mod provenance;
pub mod region;
pub mod scheduler;
pub mod table;
pub mod value;

pub use claim::{Claim, ClaimId, ClaimResult, Explanation};
pub use config::LabConfig;
pub use error::{Error, Result};
pub use experiment::{Experiment, ExperimentError, ExperimentId, Status};
pub use lab::{Laboratory, LaboratoryBuilder};
pub use provenance::{ExplanationGraph, PartRef, Provenance};
pub use region::{Point, Region};
pub use scheduler::Assistant;
pub use table::{Table, TableEntry, TableId};
pub use value::Value;
