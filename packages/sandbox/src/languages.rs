// ABOUTME: Closed set of sandbox languages and their image/entrypoint dispatch table
// ABOUTME: Adding a language means adding a variant and one arm in `Language::spec`

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Directory inside the container that receives the source file
pub const WORK_DIR: &str = "/code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Go,
    Python,
    JavaScript,
    Ruby,
    Rust,
    Java,
    Cpp,
    Php,
    CSharp,
    Swift,
}

/// How the entrypoint turns source into a running program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrypointKind {
    Run,
    Interpret,
    CompileThenRun,
    BuildThenRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSpec {
    pub image: &'static str,
    pub file_name: &'static str,
    pub command: Vec<String>,
    pub kind: EntrypointKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn shell(script: &str) -> Vec<String> {
    argv(&["sh", "-c", script])
}

impl Language {
    pub const ALL: [Language; 10] = [
        Language::Go,
        Language::Python,
        Language::JavaScript,
        Language::Ruby,
        Language::Rust,
        Language::Java,
        Language::Cpp,
        Language::Php,
        Language::CSharp,
        Language::Swift,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Ruby => "ruby",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::Php => "php",
            Language::CSharp => "csharp",
            Language::Swift => "swift",
        }
    }

    /// Image, source file name, and entrypoint for this language
    pub fn spec(&self) -> LanguageSpec {
        match self {
            Language::Go => LanguageSpec {
                image: "golang:1.22-alpine",
                file_name: "main.go",
                command: argv(&["go", "run", "main.go"]),
                kind: EntrypointKind::Run,
            },
            Language::Python => LanguageSpec {
                image: "python:3.12-alpine",
                file_name: "main.py",
                command: argv(&["python", "main.py"]),
                kind: EntrypointKind::Interpret,
            },
            Language::JavaScript => LanguageSpec {
                image: "node:20-alpine",
                file_name: "main.js",
                command: argv(&["node", "main.js"]),
                kind: EntrypointKind::Interpret,
            },
            Language::Ruby => LanguageSpec {
                image: "ruby:3.3-alpine",
                file_name: "main.rb",
                command: argv(&["ruby", "main.rb"]),
                kind: EntrypointKind::Interpret,
            },
            Language::Rust => LanguageSpec {
                image: "rust:1.79-slim",
                file_name: "main.rs",
                command: shell("rustc -O main.rs -o /tmp/main && /tmp/main"),
                kind: EntrypointKind::CompileThenRun,
            },
            Language::Java => LanguageSpec {
                image: "eclipse-temurin:21-jdk-alpine",
                file_name: "Main.java",
                command: shell("javac -d /tmp Main.java && java -cp /tmp Main"),
                kind: EntrypointKind::CompileThenRun,
            },
            Language::Cpp => LanguageSpec {
                image: "gcc:13",
                file_name: "main.cpp",
                command: shell("g++ -O2 -std=c++17 -o /tmp/main main.cpp && /tmp/main"),
                kind: EntrypointKind::CompileThenRun,
            },
            Language::Php => LanguageSpec {
                image: "php:8.3-cli-alpine",
                file_name: "main.php",
                command: argv(&["php", "main.php"]),
                kind: EntrypointKind::Interpret,
            },
            Language::CSharp => LanguageSpec {
                image: "mcr.microsoft.com/dotnet/sdk:8.0",
                file_name: "Program.cs",
                command: shell(
                    "dotnet new console -o /tmp/app --force >/dev/null \
                     && cp Program.cs /tmp/app/Program.cs \
                     && dotnet run --project /tmp/app",
                ),
                kind: EntrypointKind::BuildThenRun,
            },
            Language::Swift => LanguageSpec {
                image: "swift:5.10",
                file_name: "main.swift",
                command: argv(&["swift", "main.swift"]),
                kind: EntrypointKind::Interpret,
            },
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "go" | "golang" => Ok(Language::Go),
            "python" | "python3" | "py" => Ok(Language::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Language::JavaScript),
            "ruby" | "rb" => Ok(Language::Ruby),
            "rust" | "rs" => Ok(Language::Rust),
            "java" => Ok(Language::Java),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "php" => Ok(Language::Php),
            "csharp" | "c#" | "cs" | "dotnet" => Ok(Language::CSharp),
            "swift" => Ok(Language::Swift),
            _ => Err(UnsupportedLanguage(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names_roundtrip() {
        for language in Language::ALL {
            assert_eq!(language.name().parse::<Language>().unwrap(), language);
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("JS".parse::<Language>().unwrap(), Language::JavaScript);
        assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("C#".parse::<Language>().unwrap(), Language::CSharp);
        assert_eq!(" golang ".parse::<Language>().unwrap(), Language::Go);
    }

    #[test]
    fn test_unknown_language() {
        let err = "cobol".parse::<Language>().unwrap_err();
        assert_eq!(err, UnsupportedLanguage("cobol".to_string()));
    }

    #[test]
    fn test_entrypoint_kinds() {
        assert_eq!(Language::Go.spec().kind, EntrypointKind::Run);
        for language in [
            Language::Python,
            Language::JavaScript,
            Language::Ruby,
            Language::Php,
            Language::Swift,
        ] {
            assert_eq!(language.spec().kind, EntrypointKind::Interpret);
        }
        for language in [Language::Rust, Language::Java, Language::Cpp] {
            assert_eq!(language.spec().kind, EntrypointKind::CompileThenRun);
        }
        assert_eq!(Language::CSharp.spec().kind, EntrypointKind::BuildThenRun);
    }

    #[test]
    fn test_commands_reference_the_source_file() {
        for language in Language::ALL {
            let spec = language.spec();
            assert!(!spec.image.is_empty());
            assert!(
                spec.command.iter().any(|arg| arg.contains(spec.file_name)),
                "{} command does not mention {}",
                language,
                spec.file_name
            );
        }
    }
}
