//! # Service Syncer
//!
//! Services are written by users in the virtual store and copied down. The
//! serving controller on the physical side fills in runtime defaults; those flow
//! back up for every field the user left unset, together with the status.
//!
//! | field                                   | direction       |
//! |-----------------------------------------|-----------------|
//! | `template.name`                         | down            |
//! | `containers[0].image`                   | down            |
//! | `containers[0].name`                    | bidirectional   |
//! | `containerConcurrency`, timeouts        | bidirectional   |
//! | `enableServiceLinks`                    | bidirectional   |
//! | `traffic`                               | bidirectional   |
//! | `status`                                | up              |

mod syncer;
