//! System tools are installed on the system (install_name_tool, codesign)
use std::{cell::RefCell, collections::HashMap, fmt, path::PathBuf, process::Command};

/// The external programs the converter shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Codesign,
    InstallNameTool,
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tool::Codesign => "codesign",
            Tool::InstallNameTool => "install_name_tool",
        };
        f.write_str(name)
    }
}

/// Errors raised while locating or running a system tool
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("could not find `{tool}`: {source}")]
    NotFound {
        tool: Tool,
        #[source]
        source: which::Error,
    },

    #[error("failed to run `{tool}`: {source}")]
    Spawn {
        tool: Tool,
        #[source]
        source: std::io::Error,
    },

    #[error("`{tool}` exited with {status}: {stderr}")]
    Failed {
        tool: Tool,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Locates tools on `PATH` once and remembers where they were found.
#[derive(Debug, Clone, Default)]
pub struct SystemTools {
    found_tools: RefCell<HashMap<Tool, PathBuf>>,
}

impl SystemTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find `tool` on `PATH`.
    pub fn find_tool(&self, tool: Tool) -> Result<PathBuf, ToolError> {
        if let Some(path) = self.found_tools.borrow().get(&tool) {
            return Ok(path.clone());
        }

        let path =
            which::which(tool.to_string()).map_err(|source| ToolError::NotFound { tool, source })?;
        tracing::debug!("Found {} at {}", tool, path.display());
        self.found_tools.borrow_mut().insert(tool, path.clone());
        Ok(path)
    }

    /// A command for `tool`, ready for arguments.
    pub fn call(&self, tool: Tool) -> Result<Command, ToolError> {
        Ok(Command::new(self.find_tool(tool)?))
    }

    /// Run a prepared command and fail if it does not exit successfully.
    pub fn run(&self, tool: Tool, command: &mut Command) -> Result<(), ToolError> {
        tracing::trace!("Running {:?}", command);
        let output = command
            .output()
            .map_err(|source| ToolError::Spawn { tool, source })?;
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names() {
        assert_eq!(Tool::Codesign.to_string(), "codesign");
        assert_eq!(Tool::InstallNameTool.to_string(), "install_name_tool");
    }

    #[test]
    #[cfg(target_os = "macos")]
    fn test_system_tool() {
        let system_tools = SystemTools::new();
        let path = system_tools.find_tool(Tool::InstallNameTool).unwrap();
        assert!(path.is_absolute());

        let found_tools = system_tools.found_tools.borrow();
        assert!(found_tools.contains_key(&Tool::InstallNameTool));
    }

    #[test]
    #[cfg(unix)]
    fn failing_command_reports_stderr() {
        let system_tools = SystemTools::new();
        let mut command = Command::new("sh");
        command.args(["-c", "echo broken >&2; exit 3"]);

        let err = system_tools.run(Tool::Codesign, &mut command).unwrap_err();
        match err {
            ToolError::Failed { stderr, status, .. } => {
                assert_eq!(stderr, "broken");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
