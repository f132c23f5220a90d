pub mod catch_all;
pub mod interaction;
pub mod scan;
