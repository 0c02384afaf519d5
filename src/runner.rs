use crate::api_client::{ApiClient, HEADERS};
use crate::args::Args;
use anyhow::Result;
use std::io::Write;

/// Drives one invocation end to end and yields the process exit code.
#[derive(Debug)]
pub struct Runner {
    args: Args,
    client: ApiClient,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        let client = ApiClient::new(&args)?;
        Ok(Self { args, client })
    }

    pub async fn run<W: Write>(&self, out: &mut W) -> Result<i32> {
        if self.args.curl {
            writeln!(out, "{}", self.client.as_curl()?)?;
            return Ok(0);
        }

        if self.args.verbose {
            writeln!(out, "Args: {:?}", self.args)?;
            writeln!(out, "URL: {}", self.client.url())?;
            writeln!(out, "Headers: {:?}", HEADERS)?;
            writeln!(out, "Body: {}", self.client.body_json()?)?;
        }

        let mut response = self.client.send().await?;
        // Success is fixed by the status line; the body streams either way.
        let success = response.status().as_u16() < 300;
        log::debug!("query returned {}", response.status());

        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk)?;
        }

        // End with a newline whether or not the body did.
        writeln!(out)?;
        out.flush()?;

        Ok(if success { 0 } else { 1 })
    }
}
