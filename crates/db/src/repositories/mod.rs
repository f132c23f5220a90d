mod catch_all_repo;
mod interaction_repo;
mod scan_repo;

pub use catch_all_repo::CatchAllRepo;
pub use interaction_repo::InteractionRepo;
pub use scan_repo::ScanRepo;
