use std::future::Future;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::error::InputError;

/// An asynchronous source of bytes for the `,` instruction.
///
/// When a run is driven with a provider, every `,` suspends the VM until the
/// provider resolves. A provider error ends the run with
/// [`ExecError::InputUnavailable`](crate::error::ExecError::InputUnavailable).
#[allow(async_fn_in_trait)]
pub trait InputProvider {
    async fn next_byte(&mut self) -> Result<u8, InputError>;
}

/// Bytes pushed by another task. A closed channel is an input failure.
impl InputProvider for mpsc::Receiver<u8> {
    async fn next_byte(&mut self) -> Result<u8, InputError> {
        self.recv().await.ok_or(InputError::Closed)
    }
}

/// Reads one byte of standard input per `,`. End of input reads as 0.
pub struct StdinInput {
    stdin: tokio::io::Stdin,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            stdin: tokio::io::stdin(),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputProvider for StdinInput {
    async fn next_byte(&mut self) -> Result<u8, InputError> {
        match self.stdin.read_u8().await {
            Ok(byte) => Ok(byte),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

/// Adapts an async closure into a provider.
pub struct FnInput<F>(pub F);

impl<F, Fut> InputProvider for FnInput<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u8, InputError>>,
{
    async fn next_byte(&mut self) -> Result<u8, InputError> {
        (self.0)().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_provider() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(b'a').await.unwrap();
        drop(tx);
        assert_eq!(rx.next_byte().await.unwrap(), b'a');
        assert!(matches!(rx.next_byte().await, Err(InputError::Closed)));
    }

    #[tokio::test]
    async fn test_fn_provider() {
        let mut count = 0u8;
        let mut provider = FnInput(move || {
            count += 1;
            let value = count;
            async move { Ok(value) }
        });
        assert_eq!(provider.next_byte().await.unwrap(), 1);
        assert_eq!(provider.next_byte().await.unwrap(), 2);
    }
}
