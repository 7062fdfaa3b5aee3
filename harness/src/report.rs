const ANSI_CYAN: &str = "\u{1b}[36m";
const ANSI_RESET: &str = "\u{1b}[0m";
const RULE: &str = "------------------------------------------------------------------------";

fn cyan(text: impl std::fmt::Display) -> String {
    format!("{}{}{}", ANSI_CYAN, text, ANSI_RESET)
}

/// Console banner shown when the local InfluxDB server cannot be reached.
pub fn connection_error_banner(server: &str, port: Option<u16>) -> String {
    let port = port.map_or_else(|| "(unknown)".to_string(), |p| p.to_string());
    [
        String::new(),
        RULE.to_string(),
        cyan("  INFLUX CONNECTION ERROR  "),
        RULE.to_string(),
        format!(
            "  Failed to connect to local InfluxDB server at {}",
            cyan(server)
        ),
        format!(
            "  Please ensure you have Influx running on port {} and try again!",
            cyan(port)
        ),
        RULE.to_string(),
        String::new(),
    ]
    .join("\n")
}
