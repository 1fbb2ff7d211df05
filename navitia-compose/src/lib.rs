//! Builds, runs and deploys to the Docker images of a navitia platform.
//!
//! A platform is either a single container ([`SimplePlatform`]) or a group
//! of images wired together by docker-compose ([`ComposedPlatform`]).

pub mod backends;
pub mod compose;
pub mod config;
pub mod deploy;
pub mod error;
pub mod image;
pub mod lookup;
pub mod models;
pub mod options;
pub mod services;
pub mod simple;
pub mod template;

#[cfg(test)]
mod testing;

pub use compose::{ComposedPlatform, Target};
pub use config::{Naming, PlatformFile, Settings};
pub use error::{Error, Result};
pub use simple::SimplePlatform;
