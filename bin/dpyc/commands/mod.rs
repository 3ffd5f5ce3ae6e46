pub mod call;
pub mod keygen;
pub mod sign;
