#![recursion_limit = "1024"]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_json;
extern crate serde_yaml;

#[macro_use]
extern crate log;

extern crate attila_definitions;
extern crate attila_state;

#[macro_use]
extern crate error_chain;
error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {
        Defs(attila_definitions::Error, attila_definitions::ErrorKind);
    }
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
        SerdeJ(serde_json::Error);
        SerdeY(serde_yaml::Error);
        Reqe(reqwest::Error);
        UrlParse(url::ParseError);
        State(attila_state::StateError);
        UlidDecode(ulid::DecodeError);
        LogLevel(log::ParseLevelError);
    }
    errors {
        NoRegionClient(name: String) {
            description("no client for region")
            display("no Nomad client found for region '{}'", name)
        }
        UnexpectedHttpStatus(status: reqwest::StatusCode, body: String) {
            description("unexpected HTTP status from region API")
            display("unexpected HTTP status {} from region API: {}", &status, &body)
        }
        UnsupportedBindScheme(scheme: String) {
            description("unsupported bind protocol")
            display("unsupported bind protocol '{}'", &scheme)
        }
    }
}

/// Render the full cause chain of an error as a single line.
pub fn error_chain_text(e: &Error) -> String {
    e.iter()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}

/// Server configuration: load, merge, validate
pub mod config;
pub use crate::config::Config;

/// Process logging from the `log {}` config block
pub mod logger;

/// Region clients and the controller facade
pub mod nomad;
pub use crate::nomad::Controller;

/// The job registration pipeline (planner and registrar)
pub mod job;

/// Per-region topology collectors
pub mod topology;

/// HTTP router, handlers and error mapping
pub mod http;

/// Server lifecycle: restore, listeners, signals
pub mod server;
pub use crate::server::Server;
