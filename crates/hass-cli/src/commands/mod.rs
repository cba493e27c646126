//! CLI command implementations

mod call;
mod config;
mod ping;
mod states;
mod watch;

pub use call::{
    call_command, climate_mode_command, climate_temperature_command, light_command, parse_rgb,
    LightAction,
};
pub use config::{config_init, config_path, config_show, config_validate};
pub use ping::ping_command;
pub use states::{state_command, states_command};
pub use watch::watch_command;
