//! Static command metadata: which commands the server knows, whether they
//! are implemented, and their HELP text.

/// One row of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub name: &'static str,
    pub implemented: bool,
    pub help: &'static str,
}

const fn cmd(name: &'static str, implemented: bool, help: &'static str) -> CommandInfo {
    CommandInfo {
        name,
        implemented,
        help,
    }
}

/// RFC 959 order, then aliases and extensions.
pub static COMMANDS: &[CommandInfo] = &[
    cmd("USER", true, "<sp> username"),
    cmd("PASS", true, "<sp> password"),
    cmd("ACCT", false, "(specify account)"),
    cmd("CWD", true, "[ <sp> directory-name ]"),
    cmd("CDUP", true, "(change to parent directory)"),
    cmd("SMNT", false, "(structure mount)"),
    cmd("REIN", false, "(reinitialize server state)"),
    cmd("QUIT", true, "(terminate service)"),
    cmd("PORT", true, "<sp> b0, b1, b2, b3, b4, b5"),
    cmd("PASV", true, "(set server in passive mode)"),
    cmd("TYPE", true, "<sp> [ A | E | I | L ]"),
    cmd("STRU", true, "(specify file structure)"),
    cmd("MODE", true, "(specify transfer mode)"),
    cmd("RETR", true, "<sp> file-name"),
    cmd("STOR", true, "<sp> file-name"),
    cmd("STOU", true, "<sp> file-name"),
    cmd("APPE", true, "<sp> file-name"),
    cmd("ALLO", true, "allocate storage (vacuously)"),
    cmd("REST", true, "<sp> offset (restart command)"),
    cmd("RNFR", true, "<sp> file-name"),
    cmd("RNTO", true, "<sp> file-name"),
    cmd("ABOR", true, "(abort operation)"),
    cmd("DELE", true, "<sp> file-name"),
    cmd("RMD", true, "<sp> path-name"),
    cmd("MKD", true, "<sp> path-name"),
    cmd("PWD", true, "(return current directory)"),
    cmd("LIST", true, "[ <sp> path-name ]"),
    cmd("NLST", true, "[ <sp> path-name ]"),
    cmd("SITE", false, "site-cmd [ <sp> arguments ]"),
    cmd("SYST", true, "(get type of operating system)"),
    cmd("STAT", true, "[ <sp> path-name ]"),
    cmd("HELP", true, "[ <sp> <string> ]"),
    cmd("NOOP", true, ""),
    cmd("XMKD", true, "<sp> path-name"),
    cmd("XRMD", true, "<sp> path-name"),
    cmd("XPWD", true, "(return current directory)"),
    cmd("XCUP", true, "(change to parent directory)"),
    cmd("XCWD", true, "[ <sp> directory-name ]"),
    cmd("FEAT", true, "(display command extensions)"),
    cmd("OPTS", true, "<sp> cmd-name [ <sp> options ]"),
    cmd("SIZE", true, "<sp> path-name"),
    cmd("MDTM", true, "<sp> path-name"),
    cmd("MLFL", false, "(mail file)"),
    cmd("MAIL", false, "(mail to user)"),
    cmd("MSND", false, "(mail send to terminal)"),
    cmd("MSOM", false, "(mail send to terminal or mailbox)"),
    cmd("MSAM", false, "(mail send to terminal and mailbox)"),
    cmd("MRSQ", false, "(mail recipient scheme question)"),
    cmd("MRCP", false, "(mail recipient)"),
    cmd("EPRT", true, "<sp> <d> proto <d> addr <d> port <d>"),
    cmd("EPSV", true, "[ <sp> af|ALL ]"),
    cmd("LPRT", true, "<sp> af,hal,h0..hn,2,p0,p1"),
    cmd("LPSV", true, "(set server in long passive mode)"),
    cmd("ADAT", false, "<sp> security-data"),
    cmd("AUTH", false, "<sp> mechanism"),
    cmd("CCC", false, "(clear command channel)"),
    cmd("CONF", false, "<sp> confidential-msg"),
    cmd("ENC", false, "<sp> private-message"),
    cmd("MIC", false, "<sp> safe-message"),
    cmd("PBSZ", false, "<sp> buf-size"),
    cmd("PROT", false, "<sp> char"),
];

/// Extensions announced by FEAT.
pub static FEATURES: &[&str] = &[
    "MDTM",
    "SIZE",
    "REST STREAM",
    "EPRT",
    "EPSV",
    "LPRT",
    "LPSV",
];

/// Case-insensitive lookup.
pub fn lookup(name: &str) -> Option<&'static CommandInfo> {
    COMMANDS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

fn column_width() -> usize {
    let longest = COMMANDS.iter().map(|c| c.name.len()).max().unwrap_or(0);
    (longest + 8) & !7
}

/// Body lines of the HELP listing, commands laid out column-major with `*`
/// marking unimplemented ones.
pub fn help_table() -> Vec<String> {
    let width = column_width();
    let count = COMMANDS.len();
    let columns = (76 / width).max(1);
    let rows = count.div_ceil(columns);

    let mut out = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut line = String::from("   ");
        for column in 0..columns {
            let index = column * rows + row;
            let Some(info) = COMMANDS.get(index) else {
                break;
            };
            line.push_str(info.name);
            line.push(if info.implemented { ' ' } else { '*' });
            if index + rows >= count {
                break;
            }
            for _ in info.name.len() + 1..width {
                line.push(' ');
            }
        }
        out.push(line.trim_end().to_string());
    }
    out
}

/// The single-line HELP answer for one command, or `None` if unknown.
pub fn help_for(name: &str) -> Option<String> {
    let info = lookup(name)?;
    if info.implemented {
        Some(format!("Syntax: {} {}", info.name, info.help))
    } else {
        Some(format!(
            "{:<width$}\t{}; unimplemented.",
            info.name,
            info.help,
            width = column_width()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("retr").map(|c| c.name), Some("RETR"));
        assert!(lookup("BOGUS").is_none());
        assert!(!lookup("mail").unwrap().implemented);
    }

    #[test]
    fn test_help_table_lists_every_command_once() {
        let table = help_table().join(" ");
        for info in COMMANDS {
            let marked = format!("{}{}", info.name, if info.implemented { "" } else { "*" });
            assert!(
                table.split_whitespace().any(|word| word == marked),
                "{} missing from help table",
                info.name
            );
        }
        assert!(help_table().iter().all(|line| line.len() <= 80));
    }

    #[test]
    fn test_help_for_single_command() {
        assert_eq!(help_for("stor").unwrap(), "Syntax: STOR <sp> file-name");
        assert!(help_for("SMNT").unwrap().ends_with("(structure mount); unimplemented."));
        assert!(help_for("NOPE").is_none());
    }
}
