mod extract;
mod run;

pub use extract::load_pages;
pub use run::run;
