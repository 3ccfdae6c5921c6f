// SPDX-License-Identifier: GPL-3.0-or-later

//! The tool recognisers and the chain that consults them.

mod flags;
pub mod gcc;
mod source;

use super::{RecognitionError, Tool};
use crate::config;
use crate::intercept::report;
use crate::output::Entry;

/// An ordered list of tool recognisers; the first success wins.
///
/// Order matters, a program path may match the pattern of more than one
/// recogniser.
pub struct ToolChain {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolChain {
    /// Creates the recogniser chain from the configuration.
    pub fn from(config: &config::Main) -> Self {
        let compilers = config
            .compilers
            .iter()
            .map(|compiler| compiler.path.clone())
            .collect();

        ToolChain {
            tools: vec![Box::new(gcc::Gcc::new(compilers))],
        }
    }

    /// Asks the recognisers one by one; the answer of the first one that
    /// recognises the command is final.
    pub fn recognize(&self, command: &report::Command) -> Result<Vec<Entry>, RecognitionError> {
        let mut last = RecognitionError::UnknownProgram(
            command.program.to_string_lossy().to_string(),
        );
        for tool in &self.tools {
            match tool.recognize(command) {
                Ok(entries) => return Ok(entries),
                Err(error) => last = error,
            }
        }
        Err(last)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::intercept::fixtures;
    use std::collections::HashMap;

    #[test]
    fn test_chain_recognizes_compilers() {
        let chain = ToolChain::from(&config::Main::default());
        let command = fixtures::command(
            "/usr/bin/gcc",
            vec!["gcc", "-c", "main.c"],
            "/home/user",
            HashMap::new(),
        );

        let entries = chain.recognize(&command).unwrap();

        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_chain_rejects_non_compilers() {
        let chain = ToolChain::from(&config::Main::default());
        let command = fixtures::command(
            "/usr/bin/make",
            vec!["make", "all"],
            "/home/user",
            HashMap::new(),
        );

        let result = chain.recognize(&command);

        assert!(matches!(result, Err(RecognitionError::UnknownProgram(_))));
    }

    #[test]
    fn test_chain_accepts_configured_compilers() {
        let config = config::Main {
            compilers: vec![config::Compiler {
                path: "/opt/bin/mpicc".into(),
            }],
            ..Default::default()
        };
        let chain = ToolChain::from(&config);
        let command = fixtures::command(
            "/opt/bin/mpicc",
            vec!["mpicc", "-c", "main.c"],
            "/home/user",
            HashMap::new(),
        );

        let entries = chain.recognize(&command).unwrap();

        assert_eq!(entries.len(), 1);
    }
}
