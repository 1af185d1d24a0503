// src/model/mod.rs
pub mod package;
pub mod resource;

pub use package::{
    AssetFilter, Build, CloneOptions, Command, Gist, GitHub, Http, Link, Load, Local, Package,
    PackageKind, PackageType, Plugin, Release,
};
pub use resource::Resource;
