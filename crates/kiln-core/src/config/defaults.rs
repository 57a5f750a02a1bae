//! Default configuration values

/// Default build file name (TOML)
pub const DEFAULT_BUILD_FILE_TOML: &str = "kiln.toml";

/// Default build file name (YAML)
pub const DEFAULT_BUILD_FILE_YAML: &str = "kiln.yaml";

/// Parameter type used when a declaration leaves it out
pub const DEFAULT_PARAMETER_TYPE: &str = "string";

/// Get list of build file names to search for, in priority order
pub fn build_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_BUILD_FILE_TOML,
        DEFAULT_BUILD_FILE_YAML,
        ".kiln.toml",
        ".kiln.yaml",
    ]
}

pub(crate) fn default_parameter_type() -> String {
    DEFAULT_PARAMETER_TYPE.to_string()
}
