//! Per-vendor driver data.
//!
//! Each function returns a [`DriverSpec`]: a vendor tag, the connect
//! methods it supports, timeout constants, the login/enable dialogue
//! patterns, and a factory for a fresh [`DeviceHandler`] state machine (one
//! instance per connection, since the handler is mutable). Vendor
//! differences are pure data; the state machine and connect algorithm that
//! consume it live in [`crate::device`].

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConnectError;
use crate::transport::ConnectMethod;

use super::handler::DeviceHandler;

/// Timeout constants for one vendor/device class.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub connect: Duration,
    pub resp_short: Duration,
    pub resp_long: Duration,
    pub disconnect: Duration,
    pub max_idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(20),
            resp_short: Duration::from_secs(10),
            resp_long: Duration::from_secs(60),
            disconnect: Duration::from_secs(5),
            max_idle: Duration::from_secs(900),
        }
    }
}

pub struct DriverSpec {
    pub vendor: &'static str,
    pub default_connect_method: ConnectMethod,
    pub connect_methods: &'static [ConnectMethod],
    pub timeouts: Timeouts,

    /// `None` for vendors whose shell never presents a separate username
    /// prompt (SSH key/password auth happens at the transport layer and the
    /// shell only ever re-prompts for a password, e.g. TiMOS).
    pub login_prompt: Option<Regex>,
    pub password_prompt: Regex,
    pub enable_password_prompt: Option<Regex>,
    pub bad_secrets: Option<Regex>,
    pub prompt: Regex,
    pub pager: Option<(Regex, &'static str)>,
    pub disable_pager_command: Option<&'static str>,
    pub enable_command: &'static str,
    pub ansi_strip: bool,
    /// Confirmation dialogues a write-class command (save/commit) may raise,
    /// auto-answered during [`crate::device::Device::command`] the same way
    /// a pager prompt is: pattern plus the literal reply to send.
    pub save_prompts: &'static [(&'static str, &'static str)],
    /// Menu-driven pre-login dialogue for vendors that gate the shell behind
    /// a control character and a menu pick rather than a conventional
    /// username/password exchange (Nortel/Bay over Telnet). Only consulted
    /// when the resolved connect method is [`ConnectMethod::Telnet`].
    pub menu_login: Option<MenuLogin>,

    pub build_handler: fn() -> Result<DeviceHandler, ConnectError>,
}

/// Ctrl-character-and-menu-pick login sequence used in place of the generic
/// username/password dialogue. Grounded on the Nortel/Bay "Enter Ctrl-Y to
/// begin" banner: send a control byte to reach a password prompt, then pick
/// a menu option by its literal key once authenticated.
#[derive(Clone)]
pub struct MenuLogin {
    pub pre_login_prompt: Regex,
    pub ctrl_byte: u8,
    pub password_prompt: Regex,
    pub menu_option: Regex,
    pub bad_password: Regex,
    pub select_key: &'static str,
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("vendor driver pattern is a fixed literal")
}

/// Cisco IOS/IOS-XE.
pub fn cisco() -> DriverSpec {
    DriverSpec {
        vendor: "cisco",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2, ConnectMethod::Telnet],
        timeouts: Timeouts::default(),
        login_prompt: Some(re(r"[Uu]sername:\s*$|[Ll]ogin:\s*$")),
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: Some(re(r"^\x00*\r(Enable )?Password:")),
        bad_secrets: Some(re(r"% Bad secrets|Access denied")),
        prompt: re(r"^\S+\(\S+\)#\s*$|^[^\s#]+#\s*$|^[^\s<]+>\s*$"),
        pager: Some((re(r"\s*<--- More --->\s*"), " ")),
        disable_pager_command: Some("terminal length 0"),
        enable_command: "enable",
        ansi_strip: true,
        save_prompts: &[],
        menu_login: None,
        build_handler: build_cisco_handler,
    }
}

fn build_cisco_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![
            ("Config".to_string(), vec![r"^\S+\(\S+\)#\s*$"]),
            ("Enable".to_string(), vec![r"^[^\s#]+#\s*$"]),
            ("Login".to_string(), vec![r"^[^\s<]+>\s*$"]),
        ],
        Vec::<(String, &str, String)>::new(),
        vec![(
            "EnablePassword".to_string(),
            (true, "EnablePassword".to_string(), true),
            vec![r"^\x00*\r(Enable )?Password:"],
        )],
        vec![r"\s*<--- More --->\s*"],
        vec![
            r"% Invalid command at '\^' marker\.",
            r"% Invalid parameter detected at '\^' marker\.",
            r"\^$",
            r"^%.+",
            r"^Command authorization failed.*",
            r"^Command rejected:.*",
            r"ERROR:.+",
            r"Invalid password",
            r"Access denied.",
        ],
        vec![
            ("Login".to_string(), "enable".to_string(), "Enable".to_string(), false, false),
            ("Enable".to_string(), "configure terminal".to_string(), "Config".to_string(), false, false),
            ("Config".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
            ("Enable".to_string(), "exit".to_string(), "Login".to_string(), true, false),
        ],
        vec![r"ERROR: object \(.+\) does not exist."],
        HashMap::new(),
    )
}

/// Huawei VRP.
pub fn huawei() -> DriverSpec {
    DriverSpec {
        vendor: "huawei",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2],
        timeouts: Timeouts::default(),
        login_prompt: Some(re(r"[Uu]sername:\s*$")),
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: None,
        bad_secrets: Some(re(r"Error: .*[Pp]assword")),
        prompt: re(r"^(HRP_M|HRP_S)?\[.+]+\s*$|^(RBM_P|RBM_S)?<.+>\s*$"),
        pager: Some((re(r"\s*---- More ----\s*"), " ")),
        disable_pager_command: Some("screen-length 0 temporary"),
        enable_command: "system-view",
        ansi_strip: true,
        save_prompts: &[
            (r"Are you sure to continue\?\[Y\/N\]: ", "y"),
            (
                r"Warning: The current configuration will be written to the device. Continue\? \[Y\/N\]: ",
                "y",
            ),
        ],
        menu_login: None,
        build_handler: build_huawei_handler,
    }
}

fn build_huawei_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![
            ("Config".to_string(), vec![r"^(HRP_M|HRP_S){0,1}\[.+]+\s*$"]),
            ("Enable".to_string(), vec![r"^(RBM_P|RBM_S)?<.+>\s*$"]),
        ],
        Vec::<(String, &str, String)>::new(),
        vec![(
            "Save".to_string(),
            (false, "y".to_string(), true),
            vec![
                r"Are you sure to continue\?\[Y\/N\]: ",
                r"Warning: The current configuration will be written to the device. Continue\? \[Y\/N\]: ",
            ],
        )],
        vec![r"\s*---- More ----\s*"],
        vec![r"Error: .+$", r"\^$"],
        vec![
            ("Enable".to_string(), "system-view".to_string(), "Config".to_string(), false, false),
            ("Config".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
        ],
        vec![
            r"Error: Address item conflicts!",
            r"Error: The address item does not exist!",
            r"This condition has already been configured",
        ],
        HashMap::new(),
    )
}

/// H3C Comware.
pub fn h3c() -> DriverSpec {
    DriverSpec {
        vendor: "h3c",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2],
        timeouts: Timeouts::default(),
        login_prompt: Some(re(r"[Uu]sername:\s*$")),
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: None,
        bad_secrets: None,
        prompt: re(r"^(RBM_P|RBM_S)?\[.+\]\s*$|^(RBM_P|RBM_S)?<.+>\s*$"),
        pager: Some((re(r"\s*---- More ----\s*"), " ")),
        disable_pager_command: Some("screen-length disable"),
        enable_command: "system-view",
        ansi_strip: true,
        save_prompts: &[],
        menu_login: None,
        build_handler: build_h3c_handler,
    }
}

fn build_h3c_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![
            ("Config".to_string(), vec![r"^(RBM_P|RBM_S)?\[.+\]\s*$"]),
            ("Enable".to_string(), vec![r"^(RBM_P|RBM_S)?<.+>\s*$"]),
        ],
        Vec::<(String, &str, String)>::new(),
        Vec::<(String, (bool, String, bool), Vec<&str>)>::new(),
        vec![r"\s*---- More ----\s*"],
        vec![
            r".+\^.+",
            r".+%.+",
            r".+doesn't exist.+",
            r".+does not exist.+",
        ],
        vec![
            ("Enable".to_string(), "system-view".to_string(), "Config".to_string(), false, false),
            ("Config".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
        ],
        Vec::<&str>::new(),
        HashMap::new(),
    )
}

/// Hillstone StoneOS.
pub fn hillstone() -> DriverSpec {
    DriverSpec {
        vendor: "hillstone",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2],
        timeouts: Timeouts::default(),
        login_prompt: Some(re(r"[Uu]sername:\s*$")),
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: None,
        bad_secrets: None,
        prompt: re(r"^.+#\s\r{0,1}$|^.+\(config.*\)\s*#\s\r{0,1}$"),
        pager: Some((re(r"\s*--More--\s*"), " ")),
        disable_pager_command: Some("terminal length 0"),
        enable_command: "config",
        ansi_strip: true,
        save_prompts: &[
            (r"Save configuration, are you sure\? \[y\]\/n: ", "y"),
            (r"Backup start configuration file, are you sure\? y\/\[n\]: ", "y"),
        ],
        menu_login: None,
        build_handler: build_hillstone_handler,
    }
}

fn build_hillstone_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![
            ("Enable".to_string(), vec![r"^.+#\s\r{0,1}$"]),
            ("Config".to_string(), vec![r"^.+\(config.*\)\s*#\s\r{0,1}$"]),
        ],
        Vec::<(String, &str, String)>::new(),
        vec![(
            "Save".to_string(),
            (false, "y".to_string(), true),
            vec![
                r"Save configuration, are you sure\? \[y\]\/n: ",
                r"Backup start configuration file, are you sure\? y\/\[n\]: ",
            ],
        )],
        vec![r"\s*--More--\s*"],
        vec![
            r".+\^.+",
            r".+%.+",
            r".+doesn't exist.+",
            r".+does not exist.+",
        ],
        vec![
            ("Enable".to_string(), "config".to_string(), "Config".to_string(), false, false),
            ("Config".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
        ],
        vec![
            r"Error: Schedule entity (.+) is not found",
            r"Error: Failed to find this service",
        ],
        HashMap::new(),
    )
}

/// Juniper JunOS.
pub fn juniper() -> DriverSpec {
    DriverSpec {
        vendor: "juniper",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2],
        timeouts: Timeouts::default(),
        login_prompt: Some(re(r"[Ll]ogin:\s*$")),
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: None,
        bad_secrets: None,
        prompt: re(r"^\S+@\S+#\s*$|^\S+@\S+>\s*$"),
        pager: Some((re(r"---\(more.*\)---"), " ")),
        disable_pager_command: Some("set cli screen-length 0"),
        enable_command: "configure",
        ansi_strip: true,
        save_prompts: &[(r"Exit with uncommitted changes\? \[yes,no\] \(yes\) ", "yes")],
        menu_login: None,
        build_handler: build_juniper_handler,
    }
}

fn build_juniper_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![
            ("Config".to_string(), vec![r"^\S+@\S+#\s*$"]),
            ("Enable".to_string(), vec![r"^\S+@\S+>\s*$"]),
        ],
        Vec::<(String, &str, String)>::new(),
        vec![(
            "Save".to_string(),
            (false, "yes".to_string(), true),
            vec![r"Exit with uncommitted changes\? \[yes,no\] \(yes\) "],
        )],
        vec![r"---\(more.*\)---"],
        vec![
            r".*unknown command.*",
            r"syntax error.*",
            r"error:.+",
            r".+not found.*",
        ],
        vec![
            ("Enable".to_string(), "configure".to_string(), "Config".to_string(), false, false),
            ("Config".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
        ],
        vec![
            r"warning: statement not found",
            r"warning: element \S+ not found",
        ],
        HashMap::new(),
    )
}

/// Array Networks AG/vAPV.
pub fn array() -> DriverSpec {
    DriverSpec {
        vendor: "array",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2],
        timeouts: Timeouts::default(),
        login_prompt: Some(re(r"[Uu]sername:\s*$")),
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: Some(re(r"^\x00*\rEnable password:")),
        bad_secrets: Some(re(r"Access denied!")),
        prompt: re(r"^[^\s<]+>\s*$|^[^\s#]+#\s*$|^\S+\(\S+\)#\s*$"),
        pager: Some((re(r"\s*--More--\s*"), " ")),
        disable_pager_command: Some("terminal length 0"),
        enable_command: "enable",
        ansi_strip: true,
        save_prompts: &[],
        menu_login: None,
        build_handler: build_array_handler,
    }
}

fn build_array_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![
            ("Login".to_string(), vec![r"^[^\s<]+>\s*$"]),
            ("Enable".to_string(), vec![r"^[^\s#]+#\s*$"]),
            ("Config".to_string(), vec![r"^\S+\(\S+\)#\s*$"]),
        ],
        vec![
            ("VSiteConfig".to_string(), r"^(?<VS>\S+)\(\S+\)\$\s*$", "VS".to_string()),
            ("VSiteEnable".to_string(), r"^(?<VS>\S+)\$\s*$", "VS".to_string()),
        ],
        vec![(
            "EnablePassword".to_string(),
            (true, "EnablePassword".to_string(), true),
            vec![r"^\x00*\rEnable password:"],
        )],
        vec![r"\s*--More--\s*"],
        vec![r"Access denied!", r"Netpool .+ does not exist", r"\^$"],
        vec![
            ("Login".to_string(), "enable".to_string(), "Enable".to_string(), false, false),
            ("Enable".to_string(), "configure terminal".to_string(), "Config".to_string(), false, false),
            ("Config".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
            ("Enable".to_string(), "exit".to_string(), "Login".to_string(), true, false),
            ("Enable".to_string(), "switch {}".to_string(), "VSiteEnable".to_string(), false, true),
            ("VSiteEnable".to_string(), "configure terminal".to_string(), "VSiteConfig".to_string(), false, false),
            ("VSiteConfig".to_string(), "exit".to_string(), "VSiteEnable".to_string(), true, false),
            ("VSiteEnable".to_string(), "exit".to_string(), "Enable".to_string(), true, false),
        ],
        Vec::<&str>::new(),
        HashMap::new(),
    )
}

/// Netscreen ScreenOS. No distinct enable mode; the shell prompt itself is
/// privileged once authenticated, so `enable_command` is a no-op and the
/// handler has a single prompt state.
pub fn netscreen() -> DriverSpec {
    DriverSpec {
        vendor: "netscreen",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2],
        timeouts: Timeouts::default(),
        login_prompt: Some(re(r"[Ll]ogin:\s*$")),
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: None,
        bad_secrets: None,
        prompt: re(r"\S+\s?->\s*$"),
        pager: None,
        disable_pager_command: Some("set console page 0"),
        enable_command: "",
        ansi_strip: false,
        save_prompts: &[(r"Configuration modified, save\?", "n")],
        menu_login: None,
        build_handler: build_netscreen_handler,
    }
}

fn build_netscreen_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![("Enable".to_string(), vec![r"\S+\s?->\s*$"])],
        Vec::<(String, &str, String)>::new(),
        vec![(
            "Save".to_string(),
            (false, "n".to_string(), false),
            vec![r"Configuration modified, save\?"],
        )],
        vec![],
        vec![r"^unknown keyword", r"^invalid"],
        vec![],
        vec![],
        HashMap::new(),
    )
}

/// Nortel/Bay Networks menu-driven CLI. Over Telnet, login is gated behind
/// an "Enter Ctrl-Y to begin" banner rather than a conventional
/// username/password dialogue: a Ctrl-Y byte reaches a password prompt,
/// then a menu option is matched and the literal key `"C"` is sent to pick
/// the Command Line Interface. Other connect methods have no separate login
/// step; authentication happens at the transport layer.
pub fn nortel_bay() -> DriverSpec {
    DriverSpec {
        vendor: "nortel_bay",
        default_connect_method: ConnectMethod::Telnet,
        connect_methods: &[ConnectMethod::Telnet, ConnectMethod::Sshv1Cli],
        timeouts: Timeouts::default(),
        login_prompt: None,
        password_prompt: re(r"Enter Password:"),
        enable_password_prompt: None,
        bad_secrets: Some(re(r"nvalid [Pp]assword")),
        prompt: re(r".+\s?[>#]\s*$"),
        pager: Some((re(r"----More .+----"), " ")),
        disable_pager_command: None,
        enable_command: "",
        ansi_strip: true,
        save_prompts: &[],
        menu_login: Some(MenuLogin {
            pre_login_prompt: re(r"Enter Ctrl-Y to begin"),
            ctrl_byte: 0x19,
            password_prompt: re(r"Enter Password:"),
            menu_option: re(r"ommand Line Interface"),
            bad_password: re(r"nvalid [Pp]assword"),
            select_key: "C",
        }),
        build_handler: build_nortel_bay_handler,
    }
}

fn build_nortel_bay_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![("Enable".to_string(), vec![r"^#\s*$"])],
        Vec::<(String, &str, String)>::new(),
        Vec::<(String, (bool, String, bool), Vec<&str>)>::new(),
        Vec::<&str>::new(),
        vec![r"^Error:.+", r"^Invalid input"],
        vec![],
        Vec::<&str>::new(),
        HashMap::new(),
    )
}

/// Alcatel-Lucent OmniSwitch AOS. DOS-style `\r\n` line endings are handled
/// generically by [`crate::transport::sanitize::dos_to_unix`], applied
/// unconditionally during command output collection; nothing vendor-specific
/// is needed here for that beyond leaving `ansi_strip` honest.
pub fn omniswitch() -> DriverSpec {
    DriverSpec {
        vendor: "omniswitch",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2, ConnectMethod::Telnet],
        timeouts: Timeouts {
            resp_short: Duration::from_secs(17),
            ..Timeouts::default()
        },
        login_prompt: Some(re(r"login\s*:\s*$")),
        password_prompt: re(r"password\s*:\s*$"),
        enable_password_prompt: None,
        bad_secrets: None,
        prompt: re(r"->\s*$"),
        pager: None,
        disable_pager_command: None,
        enable_command: "",
        ansi_strip: false,
        save_prompts: &[],
        menu_login: None,
        build_handler: build_omniswitch_handler,
    }
}

fn build_omniswitch_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![("Enable".to_string(), vec![r"->\s*$"])],
        Vec::<(String, &str, String)>::new(),
        Vec::<(String, (bool, String, bool), Vec<&str>)>::new(),
        Vec::<&str>::new(),
        vec![r"^ERROR:.+"],
        vec![],
        Vec::<&str>::new(),
        HashMap::new(),
    )
}

/// Nokia/Alcatel-Lucent TiMOS (7x50 SR). No separate username prompt: the
/// shell re-prompts for a password directly, so `login_prompt` is `None`
/// and [`crate::device::Device::login`] falls back to a two-way expect.
pub fn timos() -> DriverSpec {
    DriverSpec {
        vendor: "timos",
        default_connect_method: ConnectMethod::Sshv2,
        connect_methods: &[ConnectMethod::Sshv2],
        timeouts: Timeouts::default(),
        login_prompt: None,
        password_prompt: re(r"[Pp]assword:\s*$"),
        enable_password_prompt: None,
        bad_secrets: None,
        prompt: re(r"\*?[AB]:\S+[#\$]\s*$"),
        pager: None,
        disable_pager_command: Some("environment no more"),
        enable_command: "",
        ansi_strip: true,
        save_prompts: &[],
        menu_login: None,
        build_handler: build_timos_handler,
    }
}

fn build_timos_handler() -> Result<DeviceHandler, ConnectError> {
    DeviceHandler::new(
        vec![("Enable".to_string(), vec![r"\*?[AB]:\S+[#\$]\s*$"])],
        Vec::<(String, &str, String)>::new(),
        Vec::<(String, (bool, String, bool), Vec<&str>)>::new(),
        Vec::<&str>::new(),
        vec![r"^MINOR:.+", r"^MAJOR:.+"],
        vec![],
        Vec::<&str>::new(),
        HashMap::new(),
    )
}

/// Registry of vendor driver tags to their `DriverSpec` builder, used by
/// the device factory. `NoSuchVendorError` is raised one layer up when a
/// lookup misses.
pub static VENDORS: Lazy<HashMap<&'static str, fn() -> DriverSpec>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, fn() -> DriverSpec> = HashMap::new();
    m.insert("cisco", cisco);
    m.insert("huawei", huawei);
    m.insert("h3c", h3c);
    m.insert("hillstone", hillstone);
    m.insert("juniper", juniper);
    m.insert("array", array);
    m.insert("netscreen", netscreen);
    m.insert("nortel_bay", nortel_bay);
    m.insert("omniswitch", omniswitch);
    m.insert("timos", timos);
    m
});

pub fn lookup(vendor: &str) -> Option<DriverSpec> {
    VENDORS.get(vendor).map(|f| f())
}
