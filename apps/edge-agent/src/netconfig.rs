use std::fmt;
use tokio::process::Command;

/// Effective IPv4 settings for one interface, as exchanged over the
/// NetworkService facade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSettings {
    pub interface_name: String,
    pub ip_address: String,
    pub mac_address: String,
    pub subnet_mask: String,
    pub gateway: String,
    pub dns: String,
    pub mode: Mode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Unspecified,
    Dhcp,
    Manual,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Unspecified => "unspecified",
            Mode::Dhcp => "dhcp",
            Mode::Manual => "manual",
        }
    }

    pub fn raw(self) -> &'static str {
        match self {
            Mode::Unspecified => "NETWORK_MODE_UNSPECIFIED",
            Mode::Dhcp => "NETWORK_MODE_DHCP",
            Mode::Manual => "NETWORK_MODE_MANUAL",
        }
    }
}

/// Error taxonomy of the facade: unknown interface, unsupported platform, or
/// a tooling subprocess that exited non-zero.
#[derive(Debug)]
pub enum NetError {
    NotFound(String),
    Unsupported(String),
    CommandFailed(String),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::NotFound(message) => write!(f, "not found: {message}"),
            NetError::Unsupported(message) => write!(f, "unsupported: {message}"),
            NetError::CommandFailed(message) => write!(f, "command failed: {message}"),
        }
    }
}

impl std::error::Error for NetError {}

/// Empty interface name resolves to the interface owning the default route.
pub async fn resolve_interface(name: &str) -> Result<String, NetError> {
    let name = name.trim();
    if !name.is_empty() {
        return Ok(name.to_string());
    }
    default_interface().await
}

#[cfg(target_os = "linux")]
async fn default_interface() -> Result<String, NetError> {
    let table = tokio::fs::read_to_string("/proc/net/route")
        .await
        .map_err(|err| NetError::CommandFailed(format!("read /proc/net/route: {err}")))?;
    default_interface_from_route_table(&table)
        .ok_or_else(|| NetError::NotFound("no default route".to_string()))
}

#[cfg(target_os = "macos")]
async fn default_interface() -> Result<String, NetError> {
    let output = run_command("netstat", &["-rn"]).await?;
    default_interface_from_netstat(&output)
        .ok_or_else(|| NetError::NotFound("no default route".to_string()))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn default_interface() -> Result<String, NetError> {
    Err(NetError::Unsupported(
        "default-route detection not implemented for this platform".to_string(),
    ))
}

/// `/proc/net/route` rows: Iface Destination Gateway Flags ...; the default
/// route has destination 00000000.
fn default_interface_from_route_table(table: &str) -> Option<String> {
    for line in table.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let iface = fields.next()?;
        let destination = fields.next()?;
        if destination == "00000000" {
            return Some(iface.to_string());
        }
    }
    None
}

/// `netstat -rn` default row: `default <gateway> <flags> <iface>` (interface
/// is the last column on macOS).
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn default_interface_from_netstat(output: &str) -> Option<String> {
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("default") {
            continue;
        }
        if let Some(iface) = fields.last() {
            return Some(iface.to_string());
        }
    }
    None
}

pub async fn get_config(interface_name: &str) -> Result<NetworkSettings, NetError> {
    let interface_name = resolve_interface(interface_name).await?;
    read_config(&interface_name).await
}

pub async fn update_config(settings: &NetworkSettings) -> Result<(), NetError> {
    let interface_name = resolve_interface(&settings.interface_name).await?;
    write_config(&interface_name, settings).await
}

#[cfg(target_os = "linux")]
async fn read_config(interface_name: &str) -> Result<NetworkSettings, NetError> {
    let output = run_command(
        "nmcli",
        &[
            "-t",
            "-f",
            "ipv4.method,ipv4.addresses,ipv4.gateway,ipv4.dns",
            "connection",
            "show",
            interface_name,
        ],
    )
    .await
    .map_err(|err| match err {
        NetError::CommandFailed(message) if message.contains("no such connection") => {
            NetError::NotFound(format!("interface {interface_name}"))
        }
        other => other,
    })?;

    let mut settings = parse_nmcli_output(interface_name, &output);
    settings.mac_address = read_linux_mac(interface_name).await.unwrap_or_default();
    Ok(settings)
}

#[cfg(target_os = "linux")]
async fn read_linux_mac(interface_name: &str) -> Option<String> {
    let raw = tokio::fs::read_to_string(format!("/sys/class/net/{interface_name}/address"))
        .await
        .ok()?;
    let mac = raw.trim().to_uppercase();
    if mac.is_empty() {
        None
    } else {
        Some(mac)
    }
}

#[cfg(target_os = "linux")]
async fn write_config(interface_name: &str, settings: &NetworkSettings) -> Result<(), NetError> {
    let prefix = mask_to_prefix(&settings.subnet_mask).ok_or_else(|| {
        NetError::CommandFailed(format!("invalid subnet mask {}", settings.subnet_mask))
    })?;
    let address = format!("{}/{prefix}", settings.ip_address);

    run_command(
        "nmcli",
        &[
            "connection",
            "modify",
            interface_name,
            "ipv4.method",
            "manual",
            "ipv4.addresses",
            &address,
            "ipv4.gateway",
            &settings.gateway,
            "ipv4.dns",
            &settings.dns,
        ],
    )
    .await?;
    run_command("nmcli", &["connection", "up", interface_name]).await?;
    Ok(())
}

#[cfg(target_os = "macos")]
async fn read_config(interface_name: &str) -> Result<NetworkSettings, NetError> {
    let output = run_command("networksetup", &["-getinfo", interface_name]).await?;
    if output.contains("** Error") {
        return Err(NetError::NotFound(format!("interface {interface_name}")));
    }
    let mut settings = parse_getinfo_output(interface_name, &output);

    if let Ok(dns) = run_command("networksetup", &["-getdnsservers", interface_name]).await {
        if !dns.contains("There aren't any DNS Servers") {
            settings.dns = dns.split_whitespace().collect::<Vec<_>>().join(",");
        }
    }
    Ok(settings)
}

#[cfg(target_os = "macos")]
async fn write_config(interface_name: &str, settings: &NetworkSettings) -> Result<(), NetError> {
    run_command(
        "networksetup",
        &[
            "-setmanual",
            interface_name,
            &settings.ip_address,
            &settings.subnet_mask,
            &settings.gateway,
        ],
    )
    .await?;
    if !settings.dns.is_empty() {
        let servers: Vec<&str> = settings.dns.split(',').map(str::trim).collect();
        let mut args = vec!["-setdnsservers", interface_name];
        args.extend(servers);
        run_command("networksetup", &args).await?;
    }
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn read_config(_interface_name: &str) -> Result<NetworkSettings, NetError> {
    Err(NetError::Unsupported(
        "network configuration not implemented for this platform".to_string(),
    ))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn write_config(
    _interface_name: &str,
    _settings: &NetworkSettings,
) -> Result<(), NetError> {
    Err(NetError::Unsupported(
        "network configuration not implemented for this platform".to_string(),
    ))
}

async fn run_command(program: &str, args: &[&str]) -> Result<String, NetError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|err| NetError::CommandFailed(format!("spawn {program}: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(program, status = ?output.status.code(), stderr = %stderr.trim(), "command failed");
        return Err(NetError::CommandFailed(format!(
            "{program} exited with {:?}: {}",
            output.status.code(),
            stderr.trim().to_lowercase()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `nmcli -t` key:value lines.
fn parse_nmcli_output(interface_name: &str, output: &str) -> NetworkSettings {
    let mut settings = NetworkSettings {
        interface_name: interface_name.to_string(),
        ..Default::default()
    };

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key {
            "ipv4.method" => {
                settings.mode = match value {
                    "auto" => Mode::Dhcp,
                    "manual" => Mode::Manual,
                    _ => Mode::Unspecified,
                };
            }
            "ipv4.addresses" => {
                let first = value.split(';').next().unwrap_or_default();
                match first.split_once('/') {
                    Some((ip, prefix)) => {
                        settings.ip_address = ip.to_string();
                        if let Some(mask) =
                            prefix.parse().ok().and_then(prefix_to_mask)
                        {
                            settings.subnet_mask = mask;
                        }
                    }
                    None => settings.ip_address = first.to_string(),
                }
            }
            "ipv4.gateway" => settings.gateway = value.to_string(),
            "ipv4.dns" => {
                settings.dns = value
                    .split(';')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .collect::<Vec<_>>()
                    .join(",");
            }
            _ => {}
        }
    }
    settings
}

/// Parses `networksetup -getinfo` output.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_getinfo_output(interface_name: &str, output: &str) -> NetworkSettings {
    let mut settings = NetworkSettings {
        interface_name: interface_name.to_string(),
        ..Default::default()
    };

    for line in output.lines() {
        if line.starts_with("DHCP Configuration") {
            settings.mode = Mode::Dhcp;
        } else if line.starts_with("Manual Configuration") {
            settings.mode = Mode::Manual;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "IP address" => settings.ip_address = value.to_string(),
            "Subnet mask" => settings.subnet_mask = value.to_string(),
            "Router" => settings.gateway = value.to_string(),
            "Ethernet Address" => settings.mac_address = value.to_uppercase(),
            _ => {}
        }
    }
    settings
}

pub fn prefix_to_mask(prefix_length: u32) -> Option<String> {
    if prefix_length > 32 {
        return None;
    }
    let mask: u32 = if prefix_length == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_length)
    };
    Some(std::net::Ipv4Addr::from(mask).to_string())
}

pub fn mask_to_prefix(mask: &str) -> Option<u32> {
    let addr: std::net::Ipv4Addr = mask.parse().ok()?;
    let value = u32::from(addr);
    // A valid mask is a run of ones followed by a run of zeros.
    let prefix = value.leading_ones();
    if value.checked_shl(prefix).unwrap_or(0) != 0 {
        return None;
    }
    Some(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interface_from_route_table_finds_zero_destination() {
        let table = "Iface\tDestination\tGateway \tFlags\n\
                     eth1\t0001A8C0\t00000000\t0001\n\
                     eth0\t00000000\t0101A8C0\t0003\n";
        assert_eq!(
            default_interface_from_route_table(table).as_deref(),
            Some("eth0")
        );
        assert_eq!(default_interface_from_route_table("Iface\tDestination\n"), None);
    }

    #[test]
    fn default_interface_from_netstat_takes_last_column() {
        let output = "Routing tables\n\nInternet:\n\
                      Destination        Gateway            Flags           Netif Expire\n\
                      default            192.168.1.1        UGScg             en0\n\
                      127                127.0.0.1          UCS               lo0\n";
        assert_eq!(
            default_interface_from_netstat(output).as_deref(),
            Some("en0")
        );
        assert_eq!(default_interface_from_netstat("no default here\n"), None);
    }

    #[test]
    fn nmcli_output_parses_into_settings() {
        let output = "ipv4.method:manual\n\
                      ipv4.addresses:192.168.1.50/24;10.0.0.2/8\n\
                      ipv4.gateway:192.168.1.1\n\
                      ipv4.dns:1.1.1.1;8.8.8.8\n";
        let settings = parse_nmcli_output("eth0", output);
        assert_eq!(settings.interface_name, "eth0");
        assert_eq!(settings.mode, Mode::Manual);
        assert_eq!(settings.ip_address, "192.168.1.50");
        assert_eq!(settings.subnet_mask, "255.255.255.0");
        assert_eq!(settings.gateway, "192.168.1.1");
        assert_eq!(settings.dns, "1.1.1.1,8.8.8.8");
    }

    #[test]
    fn nmcli_dhcp_method_maps_to_dhcp_mode() {
        let settings = parse_nmcli_output("eth0", "ipv4.method:auto\n");
        assert_eq!(settings.mode, Mode::Dhcp);
        assert_eq!(parse_nmcli_output("eth0", "ipv4.method:weird\n").mode, Mode::Unspecified);
    }

    #[test]
    fn getinfo_output_parses_into_settings() {
        let output = "DHCP Configuration\n\
                      IP address: 192.168.1.77\n\
                      Subnet mask: 255.255.255.0\n\
                      Router: 192.168.1.1\n\
                      Ethernet Address: aa:bb:cc:dd:ee:ff\n";
        let settings = parse_getinfo_output("en0", output);
        assert_eq!(settings.mode, Mode::Dhcp);
        assert_eq!(settings.ip_address, "192.168.1.77");
        assert_eq!(settings.subnet_mask, "255.255.255.0");
        assert_eq!(settings.gateway, "192.168.1.1");
        assert_eq!(settings.mac_address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn prefix_and_mask_conversions_round_trip() {
        assert_eq!(prefix_to_mask(24).as_deref(), Some("255.255.255.0"));
        assert_eq!(prefix_to_mask(16).as_deref(), Some("255.255.0.0"));
        assert_eq!(prefix_to_mask(0).as_deref(), Some("0.0.0.0"));
        assert_eq!(prefix_to_mask(32).as_deref(), Some("255.255.255.255"));
        assert_eq!(prefix_to_mask(33), None);

        assert_eq!(mask_to_prefix("255.255.255.0"), Some(24));
        assert_eq!(mask_to_prefix("255.255.0.0"), Some(16));
        assert_eq!(mask_to_prefix("0.0.0.0"), Some(0));
        // Holes make the mask invalid.
        assert_eq!(mask_to_prefix("255.0.255.0"), None);
        assert_eq!(mask_to_prefix("garbage"), None);
    }

    #[test]
    fn mode_names_match_the_wire_contract() {
        assert_eq!(Mode::Dhcp.name(), "dhcp");
        assert_eq!(Mode::Manual.name(), "manual");
        assert_eq!(Mode::Unspecified.name(), "unspecified");
        assert_eq!(Mode::Dhcp.raw(), "NETWORK_MODE_DHCP");
    }
}
