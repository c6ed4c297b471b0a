pub mod check;
pub mod export;
pub mod path;
pub mod prepare;
