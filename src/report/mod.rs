pub mod archive;
pub mod decision;
pub mod extractor;
pub mod generator;
pub mod history;
pub mod matrix;
pub mod pipeline;
pub mod results;
pub mod sync;
