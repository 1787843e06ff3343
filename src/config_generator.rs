//! Generates an Icinga 2 `CheckCommand` object from the clap definition of this plugin, so the
//! command config can't drift away from the flags the binary actually accepts.

pub struct CommandDescription {
    arguments: Vec<ArgumentDescription>,
}

pub struct ArgumentDescription {
    flag: String,
    var: String,
    description: Option<String>,
    is_flag: bool,
    default_value: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ToIcingaCommandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid executable path")]
    InvalidExecutablePath,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandDescriptionFromError {
    #[error("argument {0} has no long name")]
    MissingLongArgument(String),
}

impl CommandDescription {
    /// Describes every visible argument of `cmd`. Custom vars are named `{var_prefix}_{flag}`.
    pub fn from_command(
        cmd: &clap::Command,
        var_prefix: &str,
    ) -> Result<Self, CommandDescriptionFromError> {
        let mut arguments = Vec::new();

        for arg in cmd.get_arguments().filter(|a| !a.is_hide_set()) {
            let long = arg.get_long().ok_or_else(|| {
                CommandDescriptionFromError::MissingLongArgument(arg.get_id().to_string())
            })?;

            let var = format!("{}_{}", var_prefix, long.replace('-', "_"));
            let description = arg.get_help().map(|s| s.to_string());

            let is_flag = matches!(
                arg.get_action(),
                clap::ArgAction::SetTrue | clap::ArgAction::SetFalse
            );

            let default_value = arg
                .get_default_values()
                .first()
                .and_then(|v| v.to_str())
                .map(|s| s.to_string());

            arguments.push(ArgumentDescription {
                flag: format!("--{}", long),
                var,
                description,
                is_flag,
                default_value,
            });
        }

        Ok(CommandDescription { arguments })
    }

    /// Renders the `CheckCommand` pointing at the currently running executable.
    pub fn to_icinga_command(&self, name: &str) -> Result<String, ToIcingaCommandError> {
        let current_exe = std::env::current_exe()?;
        let current_exe = current_exe
            .to_str()
            .ok_or(ToIcingaCommandError::InvalidExecutablePath)?;

        Ok(self.to_icinga_command_for(name, current_exe))
    }

    pub fn to_icinga_command_for(&self, name: &str, executable: &str) -> String {
        let mut out = format!("object CheckCommand \"{}\" {{\n", escape_string(name));

        out.push_str(&format!("  command = [ \"{}\" ]\n", escape_string(executable)));
        out.push_str("  arguments = {\n");
        for arg in &self.arguments {
            out.push_str(&format!("    \"{}\" = {{\n", arg.flag));

            if arg.is_flag {
                out.push_str(&format!("      set_if = \"${}$\"\n", arg.var));
            } else {
                out.push_str(&format!("      value = \"${}$\"\n", arg.var));
            }

            if let Some(description) = &arg.description {
                out.push_str(&format!(
                    "      description = \"{}\"\n",
                    escape_string(description)
                ));
            }

            out.push_str("    }\n");
        }
        out.push_str("  }\n\n");

        for arg in &self.arguments {
            if let Some(default_value) = &arg.default_value {
                out.push_str(&format!(
                    "  vars.{} = \"{}\"\n",
                    arg.var,
                    escape_string(default_value)
                ));
            }
        }

        out.push_str("}\n");
        out
    }
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
}
