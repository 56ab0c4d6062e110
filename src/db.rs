pub mod derive;
pub mod export;
pub mod fetch;
pub mod inventory;
pub mod load;
pub mod pipeline;
