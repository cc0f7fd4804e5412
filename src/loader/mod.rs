pub mod track_loader;

pub use track_loader::load as load_track;
