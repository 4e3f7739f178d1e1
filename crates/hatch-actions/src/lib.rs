//! Built-in action plugins.
//!
//! Each plugin is a parser from a raw action declaration to an [`Action`]
//! instance. [`register_builtins`] must run once at process start, before
//! any configuration is resolved.
//!
//! [`Action`]: hatch_core::Action

use hatch_core::register_action;

pub mod exec;
pub mod http;
pub mod postgres;
pub mod redis;
pub mod tcp;

/// Register every built-in plugin with the global registry.
pub fn register_builtins() {
    register_action("tcp.connect", tcp::parse);
    register_action("http.get", http::parse);
    register_action("exec", exec::parse);
    register_action("postgres.ping", postgres::parse_ping);
    register_action("postgres.truncate", postgres::parse_truncate);
    register_action("postgres.exec", postgres::parse_exec);
    register_action("redis.ping", redis::parse_ping);
    register_action("redis.truncate", redis::parse_truncate);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatch_core::registered_actions;

    #[test]
    fn all_builtins_are_registered() {
        register_builtins();
        let kinds = registered_actions();
        for kind in [
            "tcp.connect",
            "http.get",
            "exec",
            "postgres.ping",
            "postgres.truncate",
            "postgres.exec",
            "redis.ping",
            "redis.truncate",
        ] {
            assert!(kinds.contains(&kind), "missing plugin {kind}");
        }
    }
}
