//! Tool service implementations: local in-process tools, externally hosted
//! SDK plugins, and OpenAPI-described services (spec §4.6).

pub mod local;
pub mod openapi;
pub mod plugin;
pub mod registry;
