//! Amrgrid builds and maintains the grid hierarchy of a block-structured
//! adaptive mesh refinement (AMR) calculation. Each level of the hierarchy is
//! a set of disjoint rectangular boxes of cells, refined from the level below
//! by an integer ratio. Periodically the hierarchy is regridded: an
//! application tags the cells that need refinement, the tags are buffered and
//! clustered into efficient boxes (Berger-Rigoutsos), and the resulting boxes
//! are constrained to be properly nested inside the coarser levels and
//! aligned to each level's blocking factor. Run-time parameters come from a
//! ParmParse-style input table. Grids are computed identically on every rank
//! of a distributed run; tags are combined across ranks through a small
//! message-passing interface.

pub mod array;
pub mod box_set;
pub mod cluster;
pub mod config;
pub mod distribution;
pub mod error;
pub mod geometry;
pub mod hierarchy;
pub mod index_space;
pub mod int_vect;
pub mod message;
pub mod nesting;
pub mod parmparse;
pub mod regrid;
pub mod tag_field;

pub use box_set::BoxSet;
pub use config::AmrParams;
pub use error::Error;
pub use geometry::{CoordSys, Geometry, RealBox};
pub use hierarchy::Hierarchy;
pub use index_space::IndexSpace;
pub use int_vect::IntVect;
pub use parmparse::ParmParse;
pub use regrid::{ErrorEstimator, RegridPhase, RegridResult};
pub use tag_field::TagField;
