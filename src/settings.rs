use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

pub const DEBUG_FLAG: &str = "/DEBUG";
pub const REPL_FLAG: &str = "/REPL";
pub const LIBRARIES_FLAG: &str = "/ASSEMBLIES";
pub const FLAG_COUNT: &str = "/COUNT";
pub const ARGC: &str = "$ARGC";
pub const ARGV: &str = "$ARGV";
pub const PROMPT: &str = "$PROMPT";

pub const DEFAULT_PROMPT: &str = "Lychen>";

/// A value stored in the settings map
#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Text(String),
    Integer(i64),
    List(Vec<String>),
}

impl SettingValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value the way a script would see it in a string context
    pub fn to_string_repr(&self) -> String {
        match self {
            SettingValue::Bool(true) => "True".to_string(),
            SettingValue::Bool(false) => "False".to_string(),
            SettingValue::Text(s) => s.clone(),
            SettingValue::Integer(i) => i.to_string(),
            SettingValue::List(items) => items.join(","),
        }
    }
}

/// Settings derived from the command line, shared with running scripts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: BTreeMap<String, SettingValue>,
}

/// Created once at startup and handed by reference to the registry and the session
pub type SharedSettings = Arc<RwLock<Settings>>;

impl Settings {
    /// Parse raw arguments (without the program name).
    ///
    /// `/flag` stores `true`, `/flag:value` and `/flag=value` split once at the
    /// first separator of either kind and store the remainder as text. Every
    /// other token is positional and lands in `$ARGV` and `$ARG<n>`.
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut settings = Settings::default();
        let mut positional = Vec::new();
        let mut flag_count = 0i64;

        for arg in args {
            let arg: String = arg.into();
            if arg.starts_with('/') {
                flag_count += 1;
                match arg.split_once([':', '=']) {
                    Some((key, value)) => {
                        settings.set(key, SettingValue::Text(value.to_string()));
                    }
                    None => settings.set(arg, SettingValue::Bool(true)),
                }
            } else {
                settings.set(
                    format!("$ARG{}", positional.len()),
                    SettingValue::Text(arg.clone()),
                );
                positional.push(arg);
            }
        }

        settings.set(ARGC, SettingValue::Integer(positional.len() as i64));
        settings.set(ARGV, SettingValue::List(positional));
        settings.set(FLAG_COUNT, SettingValue::Integer(flag_count));
        settings.set(PROMPT, SettingValue::Text(DEFAULT_PROMPT.to_string()));
        settings
    }

    pub fn into_shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: SettingValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<SettingValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.entries.iter()
    }

    /// True only for the bare `/flag` form
    pub fn is_switch_on(&self, key: &str) -> bool {
        matches!(self.get(key), Some(SettingValue::Bool(true)))
    }

    /// The value of a `/flag:value` entry, if the flag carried one
    pub fn flag_value(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SettingValue::as_text)
    }

    pub fn argc(&self) -> usize {
        match self.get(ARGC) {
            Some(SettingValue::Integer(n)) if *n > 0 => *n as usize,
            _ => 0,
        }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.flag_value(&format!("$ARG{index}"))
    }

    /// First positional argument, the script to run
    pub fn script_path(&self) -> Option<PathBuf> {
        if self.argc() == 0 {
            return None;
        }
        self.arg(0).map(PathBuf::from)
    }

    /// Transcript file from `/REPL:<path>`; a bare or empty flag means none
    pub fn transcript_path(&self) -> Option<PathBuf> {
        self.flag_value(REPL_FLAG)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Current REPL prompt; scripts may replace it at any time
    pub fn prompt(&self) -> String {
        self.get(PROMPT)
            .map(SettingValue::to_string_repr)
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string())
    }

    /// Entries of the comma-separated extra library list
    pub fn extra_libraries(&self) -> Vec<String> {
        self.flag_value(LIBRARIES_FLAG)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_flag_is_true() {
        let settings = Settings::parse(["/DEBUG"]);
        assert_eq!(settings.get("/DEBUG"), Some(&SettingValue::Bool(true)));
        assert!(settings.is_switch_on(DEBUG_FLAG));
    }

    #[test]
    fn flag_value_splits_at_first_separator() {
        let settings = Settings::parse(["/REPL:out.txt", "/X=a:b=c", "/Y:k=v"]);
        assert_eq!(settings.flag_value("/REPL"), Some("out.txt"));
        assert_eq!(settings.flag_value("/X"), Some("a:b=c"));
        assert_eq!(settings.flag_value("/Y"), Some("k=v"));
        assert!(!settings.is_switch_on("/REPL"));
    }

    #[test]
    fn value_form_is_never_type_inferred() {
        let settings = Settings::parse(["/N=42", "/B:true"]);
        assert_eq!(settings.get("/N"), Some(&SettingValue::Text("42".into())));
        assert_eq!(settings.get("/B"), Some(&SettingValue::Text("true".into())));
    }

    #[test]
    fn positional_arguments_keep_order() {
        let settings = Settings::parse(["a.py", "/DEBUG", "second", "/Q:1", "third"]);
        assert_eq!(settings.argc(), 3);
        assert_eq!(settings.arg(0), Some("a.py"));
        assert_eq!(settings.arg(1), Some("second"));
        assert_eq!(settings.arg(2), Some("third"));
        assert_eq!(settings.arg(3), None);
        assert_eq!(
            settings.get(ARGV),
            Some(&SettingValue::List(vec![
                "a.py".into(),
                "second".into(),
                "third".into()
            ]))
        );
        assert_eq!(settings.get(FLAG_COUNT), Some(&SettingValue::Integer(2)));
    }

    #[test]
    fn synthesized_keys_present_without_arguments() {
        let settings = Settings::parse(Vec::<String>::new());
        assert_eq!(settings.get(ARGC), Some(&SettingValue::Integer(0)));
        assert_eq!(settings.get(ARGV), Some(&SettingValue::List(vec![])));
        assert_eq!(settings.get(FLAG_COUNT), Some(&SettingValue::Integer(0)));
        assert_eq!(settings.prompt(), DEFAULT_PROMPT);
    }

    #[test]
    fn unknown_flags_are_stored() {
        let settings = Settings::parse(["/Whatever", "/lower:case"]);
        assert!(settings.contains("/Whatever"));
        assert_eq!(settings.flag_value("/lower"), Some("case"));
        assert!(!settings.contains("/LOWER"));
    }

    #[test]
    fn script_and_transcript_paths() {
        let settings = Settings::parse(["job.py", "/REPL:session.txt"]);
        assert_eq!(settings.script_path(), Some(PathBuf::from("job.py")));
        assert_eq!(settings.transcript_path(), Some(PathBuf::from("session.txt")));

        let settings = Settings::parse(["/REPL:"]);
        assert!(settings.contains(REPL_FLAG));
        assert_eq!(settings.script_path(), None);
        assert_eq!(settings.transcript_path(), None);
        assert_eq!(Settings::parse(["/REPL"]).transcript_path(), None);
    }

    #[test]
    fn extra_libraries_split_on_comma() {
        let settings = Settings::parse(["/ASSEMBLIES:json, ./lib/tools.py,,csv"]);
        assert_eq!(
            settings.extra_libraries(),
            vec!["json", "./lib/tools.py", "csv"]
        );
        assert!(Settings::parse(["/ASSEMBLIES"]).extra_libraries().is_empty());
    }
}
