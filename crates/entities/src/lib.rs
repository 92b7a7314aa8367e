pub mod graph_entity;
pub mod graph_relationship;
pub mod memory_access_log;
pub mod memory_dynamics;
pub mod memory_supersession;
pub mod memory_vector;
