pub mod artifact;
pub mod audio;
pub mod collab;
pub mod composite;
pub mod encoder;
pub mod error;
pub mod footage;
pub mod graph;
pub mod ledger;
pub mod pipeline;
pub mod probe;
pub mod run;
