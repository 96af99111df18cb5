//! # Revision Syncer
//!
//! Revisions are stamped out by the serving controller from a configuration's
//! template. Their physical names extend the physical configuration name
//! (`hello-x-default-x-vsync-00001`), so the virtual mirror keeps the same
//! relation to the virtual configuration (`hello-00001`).

mod syncer;
