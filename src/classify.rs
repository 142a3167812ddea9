use regex::Regex;

//exact aliases, matched by prefix against the normalized process name.
//values may repeat: several raw names fold into one application.
const ALIASES: &[(&str, &str)] = &[
    ("code-insiders", "vscode-insiders"),
    ("code", "vscode"),
    ("chromium-browse", "chrome"),
    ("chromium", "chrome"),
    ("chrome", "chrome"),
    ("firefox", "firefox"),
    ("web content", "firefox"),
    ("python3", "python"),
    ("python", "python"),
    ("java", "java"),
    ("cursor", "cursor"),
    ("gnome-shell", "gnome-shell"),
    ("xwayland", "Xwayland"),
];

//substrings looked up in the lowercased command line, in this order
const CMD_ALIASES: &[(&str, &str)] = &[
    ("cloud-code", "cursor"),
    ("cloudcode", "cursor"),
    (".cursor/", "cursor"),
    ("/cursor/cursor", "cursor"),
    (".mount_cursor", "cursor"),
];

/// Maps a raw process name + command line to a canonical application
/// label. Tables are fixed; regex patterns are compiled once in `new`.
pub struct Classifier {
    by_len: Vec<(&'static str, &'static str)>,
    cmd_regex: Vec<(Regex, &'static str)>,
}

impl Classifier {
    pub fn new() -> Self {
        //longest key first so "code-insiders" wins over "code"
        let mut by_len: Vec<(&'static str, &'static str)> = ALIASES.to_vec();
        by_len.sort_by_key(|(k, _)| std::cmp::Reverse(k.len()));

        let cmd_regex = by_len
            .iter()
            .map(|(k, v)| {
                //the key must appear as a whole word: bounded by
                //characters outside [a-z0-9_-] or the ends of the line
                let pat = format!(
                    "(?:^|[^a-z0-9_-]){}(?:[^a-z0-9_-]|$)",
                    regex::escape(k)
                );
                (Regex::new(&pat).expect("static alias pattern"), *v)
            })
            .collect();

        Self { by_len, cmd_regex }
    }

    /// Pure and deterministic; never returns an empty label.
    pub fn classify(&self, name: &str, cmdline: &str) -> String {
        let mut app = name
            .rsplit('/')
            .next()
            .unwrap_or("")
            .split('.')
            .next()
            .unwrap_or("")
            .to_lowercase();
        if app == "python3" {
            app = "python".to_string();
        }

        for (k, v) in &self.by_len {
            if app.starts_with(k) {
                return (*v).to_string();
            }
        }

        //process names are often generic wrappers; the command line
        //carries the real identity
        let cmd = cmdline.to_lowercase();
        for (needle, v) in CMD_ALIASES {
            if cmd.contains(needle) {
                return (*v).to_string();
            }
        }
        for (re, v) in &self.cmd_regex {
            if re.is_match(&cmd) {
                return (*v).to_string();
            }
        }

        if app.is_empty() {
            "unknown".to_string()
        } else {
            app
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python3_maps_to_python() {
        let c = Classifier::new();
        assert_eq!(c.classify("python3", ""), "python");
        assert_eq!(c.classify("/usr/bin/python3.11", ""), "python");
    }

    #[test]
    fn longer_alias_wins_over_prefix() {
        let c = Classifier::new();
        assert_eq!(c.classify("code-insiders", ""), "vscode-insiders");
        assert_eq!(c.classify("code", ""), "vscode");
    }

    #[test]
    fn cmdline_substring_tier() {
        let c = Classifier::new();
        assert_eq!(
            c.classify("node", "/home/u/.cursor/extensions/server.js"),
            "cursor"
        );
    }

    #[test]
    fn cmdline_regex_requires_word_boundary() {
        let c = Classifier::new();
        assert_eq!(c.classify("wrapper", "/usr/bin/java -jar app.jar"), "java");
        //"javascript" must not match the "java" alias
        assert_eq!(c.classify("wrapper", "run javascript bundle"), "wrapper");
    }

    #[test]
    fn fallback_is_normalized_name_or_unknown() {
        let c = Classifier::new();
        assert_eq!(c.classify("MyDaemon.bin", ""), "mydaemon");
        assert_eq!(c.classify("", ""), "unknown");
    }

    #[test]
    fn deterministic() {
        let c = Classifier::new();
        let a = c.classify("chromium-browse", "--type=renderer");
        let b = c.classify("chromium-browse", "--type=renderer");
        assert_eq!(a, b);
        assert_eq!(a, "chrome");
    }
}
