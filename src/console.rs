use std::io::BufRead;
use tokio::sync::{Mutex, mpsc};

/// The operator's input, one line at a time.
///
/// Prompts and keyboard-wedge NFC readers share this single source, so a line
/// is never swallowed by another reader's buffer. Stdin is read on its own
/// thread: an abandoned read leaves that thread blocked but does not hold up
/// runtime shutdown.
pub struct Console {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl Console {
    pub fn stdin() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("stdin-lines".to_string())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to read stdin");
                            break;
                        }
                    }
                }
            })?;
        Ok(Self::from_receiver(rx))
    }

    /// Fixed input followed by end of input.
    #[cfg(test)]
    pub fn scripted(lines: &[&str]) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        for line in lines {
            let _ = tx.send(line.to_string());
        }
        Self::from_receiver(rx)
    }

    fn from_receiver(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            lines: Mutex::new(rx),
        }
    }

    /// Next line without its terminator, `None` once input is closed.
    /// Cancel safe.
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }

    /// Ask a yes/no question. End of input and Ctrl+C both answer no.
    pub async fn confirm(&self, prompt: &str) -> bool {
        eprint!("{prompt} [y/N] ");

        let answer = tokio::select! {
            line = self.next_line() => line,
            Ok(()) = tokio::signal::ctrl_c() => {
                eprintln!();
                None
            }
        };

        matches!(
            answer.as_deref().map(str::trim),
            Some("y" | "Y" | "yes")
        )
    }
}
