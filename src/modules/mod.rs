pub mod editor;
pub mod generation;
pub mod review;
pub mod send;
