pub mod lookup;
pub mod network;
pub mod output;
pub mod pipeline;
