pub mod callgraph;
pub mod registers;
pub mod unwind;
