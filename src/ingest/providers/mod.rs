pub mod ctgov;
pub mod euctr;
pub mod sample;
