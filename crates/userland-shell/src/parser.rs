//! Command-line tokenizer and parser.
//!
//! Turns raw input into structured command lines: pipelines split at
//! `&&`/`||` boundaries, an optional output redirection, and a background
//! flag. Quoting, globbing, and variable expansion are not part of this
//! shell's input language.

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Errors for command-line parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum ShellError {
    /// Malformed command line.
    #[error("parse error: {detail}")]
    #[diagnostic(code(shell::parse))]
    Parse { detail: String },
}

// ---------------------------------------------------------------------------
//  Token
// ---------------------------------------------------------------------------

/// A lexical token of the shell input language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A word (command name, argument, redirection target).
    Word(String),
    /// Pipe operator `|`.
    Pipe,
    /// And operator `&&`.
    And,
    /// Or operator `||`.
    Or,
    /// Truncating output redirection `>`.
    RedirectOut,
    /// Appending output redirection `>>`.
    RedirectAppend,
    /// Background operator `&`.
    Background,
}

/// Split one input line into tokens.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&ch) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                    tokens.push(Token::Or);
                } else {
                    tokens.push(Token::Pipe);
                }
            }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                    tokens.push(Token::And);
                } else {
                    tokens.push(Token::Background);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                    tokens.push(Token::RedirectAppend);
                } else {
                    tokens.push(Token::RedirectOut);
                }
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '|' || c == '&' || c == '>' {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    tokens
}

// ---------------------------------------------------------------------------
//  Command AST
// ---------------------------------------------------------------------------

/// A single command: executable plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCommand {
    pub exe: String,
    pub args: Vec<String>,
}

/// Commands connected by pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<SimpleCommand>,
}

/// Logical connector between two pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `&&` — run the next pipeline only on success.
    And,
    /// `||` — run the next pipeline only on failure.
    Or,
}

/// Where the final pipeline's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Stdout,
    /// `>` — create or truncate the target file.
    Truncate,
    /// `>>` — create or append to the target file.
    Append,
}

/// One fully parsed command line.
///
/// `connectors[i]` joins `pipelines[i]` and `pipelines[i + 1]`. Only the
/// final pipeline honors `out_file`/`out_mode` and `background`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub pipelines: Vec<Pipeline>,
    pub connectors: Vec<Connector>,
    pub out_file: Option<String>,
    pub out_mode: OutputMode,
    pub background: bool,
}

// ---------------------------------------------------------------------------
//  Parser
// ---------------------------------------------------------------------------

/// Parse one line of tokens. Blank lines yield `Ok(None)`.
pub fn parse_command_line(tokens: &[Token]) -> Result<Option<CommandLine>, ShellError> {
    let mut pipelines = Vec::new();
    let mut connectors = Vec::new();
    let mut commands: Vec<SimpleCommand> = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut out_file = None;
    let mut out_mode = OutputMode::Stdout;
    let mut background = false;

    fn finish_command(
        words: &mut Vec<String>,
        commands: &mut Vec<SimpleCommand>,
        after: &str,
    ) -> Result<(), ShellError> {
        if words.is_empty() {
            return Err(ShellError::Parse {
                detail: format!("expected a command before `{after}`"),
            });
        }
        let exe = words.remove(0);
        commands.push(SimpleCommand {
            exe,
            args: std::mem::take(words),
        });
        Ok(())
    }

    let mut pipe_needs_command = false;
    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        match token {
            Token::Word(word) => {
                pipe_needs_command = false;
                words.push(word.clone());
            }
            Token::Pipe => {
                finish_command(&mut words, &mut commands, "|")?;
                pipe_needs_command = true;
            }
            Token::And | Token::Or => {
                let symbol = if *token == Token::And { "&&" } else { "||" };
                finish_command(&mut words, &mut commands, symbol)?;
                pipelines.push(Pipeline {
                    commands: std::mem::take(&mut commands),
                });
                connectors.push(if *token == Token::And {
                    Connector::And
                } else {
                    Connector::Or
                });
            }
            Token::RedirectOut | Token::RedirectAppend => {
                let target = match iter.next() {
                    Some(Token::Word(word)) => word.clone(),
                    _ => {
                        return Err(ShellError::Parse {
                            detail: String::from("redirection target is missing"),
                        })
                    }
                };
                out_mode = if *token == Token::RedirectOut {
                    OutputMode::Truncate
                } else {
                    OutputMode::Append
                };
                out_file = Some(target);
            }
            Token::Background => background = true,
        }
    }

    if pipe_needs_command && words.is_empty() {
        return Err(ShellError::Parse {
            detail: String::from("command line ends with a dangling `|`"),
        });
    }
    if !words.is_empty() {
        finish_command(&mut words, &mut commands, "\n")?;
    }
    if !commands.is_empty() {
        pipelines.push(Pipeline { commands });
    } else if !connectors.is_empty() {
        return Err(ShellError::Parse {
            detail: String::from("command line ends with a dangling operator"),
        });
    } else if pipelines.is_empty() {
        return Ok(None);
    }

    Ok(Some(CommandLine {
        pipelines,
        connectors,
        out_file,
        out_mode,
        background,
    }))
}

/// Incremental line parser fed with arbitrary input chunks.
///
/// The driver reads stdin in bounded chunks and feeds them here; complete
/// lines become [`CommandLine`]s one at a time.
#[derive(Debug, Default)]
pub struct Parser {
    buffer: String,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer another chunk of raw input.
    pub fn feed(&mut self, chunk: &str) {
        self.buffer.push_str(chunk);
    }

    /// Pop the next complete line as a parsed command line. Blank lines
    /// are skipped; `None` means no complete line is buffered yet.
    pub fn next_line(&mut self) -> Option<Result<CommandLine, ShellError>> {
        loop {
            let newline = self.buffer.find('\n')?;
            let line: String = self.buffer.drain(..=newline).collect();
            match parse_command_line(&tokenize(&line)) {
                Ok(None) => continue,
                Ok(Some(command_line)) => return Some(Ok(command_line)),
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Parse whatever is left in the buffer as a final, unterminated line.
    pub fn finish(&mut self) -> Option<Result<CommandLine, ShellError>> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            return None;
        }
        match parse_command_line(&tokenize(&rest)) {
            Ok(None) => None,
            Ok(Some(command_line)) => Some(Ok(command_line)),
            Err(err) => Some(Err(err)),
        }
    }
}

// ===========================================================================
//  Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_pipeline_with_redirect() {
        let tokens = tokenize("cat notes.txt | wc -l > count");
        assert_eq!(
            tokens,
            vec![
                Token::Word("cat".to_string()),
                Token::Word("notes.txt".to_string()),
                Token::Pipe,
                Token::Word("wc".to_string()),
                Token::Word("-l".to_string()),
                Token::RedirectOut,
                Token::Word("count".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("a && b || c >> log &");
        assert!(tokens.contains(&Token::And));
        assert!(tokens.contains(&Token::Or));
        assert!(tokens.contains(&Token::RedirectAppend));
        assert!(tokens.contains(&Token::Background));
    }

    #[test]
    fn test_parse_single_command() {
        let line = parse_command_line(&tokenize("ls -l /tmp")).unwrap().unwrap();
        assert_eq!(line.pipelines.len(), 1);
        let command = &line.pipelines[0].commands[0];
        assert_eq!(command.exe, "ls");
        assert_eq!(command.args, vec!["-l", "/tmp"]);
        assert!(!line.background);
        assert_eq!(line.out_file, None);
    }

    #[test]
    fn test_parse_pipeline_segments() {
        let line = parse_command_line(&tokenize("cat f | sort | uniq && echo ok || echo bad"))
            .unwrap()
            .unwrap();
        assert_eq!(line.pipelines.len(), 3);
        assert_eq!(line.pipelines[0].commands.len(), 3);
        assert_eq!(line.connectors, vec![Connector::And, Connector::Or]);
    }

    #[test]
    fn test_parse_redirection_modes() {
        let line = parse_command_line(&tokenize("echo hi > out"))
            .unwrap()
            .unwrap();
        assert_eq!(line.out_file.as_deref(), Some("out"));
        assert_eq!(line.out_mode, OutputMode::Truncate);

        let line = parse_command_line(&tokenize("echo hi >> out"))
            .unwrap()
            .unwrap();
        assert_eq!(line.out_mode, OutputMode::Append);
    }

    #[test]
    fn test_parse_background_flag() {
        let line = parse_command_line(&tokenize("sleep 100 &")).unwrap().unwrap();
        assert!(line.background);
        assert_eq!(line.pipelines[0].commands[0].exe, "sleep");
    }

    #[test]
    fn test_blank_line_is_none() {
        assert_eq!(parse_command_line(&tokenize("   ")).unwrap(), None);
        assert_eq!(parse_command_line(&tokenize("")).unwrap(), None);
    }

    #[test]
    fn test_dangling_operators_rejected() {
        assert!(parse_command_line(&tokenize("a &&")).is_err());
        assert!(parse_command_line(&tokenize("| b")).is_err());
        assert!(parse_command_line(&tokenize("a |")).is_err());
        assert!(parse_command_line(&tokenize("echo >")).is_err());
    }

    #[test]
    fn test_incremental_feeding_across_chunks() {
        let mut parser = Parser::new();
        parser.feed("echo hel");
        assert!(parser.next_line().is_none());
        parser.feed("lo | wc -c\necho done\n");

        let first = parser.next_line().unwrap().unwrap();
        assert_eq!(first.pipelines[0].commands[0].args, vec!["hello"]);
        assert_eq!(first.pipelines[0].commands[1].exe, "wc");

        let second = parser.next_line().unwrap().unwrap();
        assert_eq!(second.pipelines[0].commands[0].exe, "echo");
        assert!(parser.next_line().is_none());
    }

    #[test]
    fn test_finish_parses_unterminated_line() {
        let mut parser = Parser::new();
        parser.feed("echo tail");
        assert!(parser.next_line().is_none());
        let line = parser.finish().unwrap().unwrap();
        assert_eq!(line.pipelines[0].commands[0].args, vec!["tail"]);
        assert!(parser.finish().is_none());
    }
}
