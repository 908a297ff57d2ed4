//! Pipeline tests driving a full run against in-memory collaborators.

mod pipeline;
