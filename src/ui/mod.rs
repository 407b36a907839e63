pub mod canvas;
pub mod windows;
