//! Parser and writer for the legacy pool config format.
//!
//! ```text
//! pool isi_viz {
//!     universe vanilla "viz.isi.edu/jobmanager-pbs" "2.4.3";
//!     gridftp "gsiftp://viz.isi.edu/data" "2.4.3";
//!     workdir "/scratch";
//!     profile env "PATH" "/usr/bin";
//! }
//! ```
//!
//! The parser is recursive descent with one token of look-ahead. The first
//! error aborts the parse. The `;` after an attribute is optional.

use std::fmt::Write;

use sitecat_core::Profile;
use sitecat_core::legacy::{GridFtpServer, JobManager, Lrc, PoolConfig, PoolSite, WorkDir};
use tracing::debug;

use crate::scanner::{ReservedWord, Scanner, Token, is_identifier};
use crate::{ConfigError, ConfigResult};

/// Parse pool config text into a [`PoolConfig`].
///
/// A repeated pool handle does not fail; the later pool is stored under a
/// synthetic `<handle>-<millis>` key (see [`PoolConfig::add`]).
pub fn parse_pool_config(input: &str) -> ConfigResult<PoolConfig> {
    let config = PoolParser::new(input)?.parse()?;
    debug!(pools = config.len(), "parsed pool config");
    Ok(config)
}

struct PoolParser<'a> {
    scanner: Scanner<'a>,
    lookahead: Option<(usize, Token)>,
    line: usize,
}

impl<'a> PoolParser<'a> {
    fn new(input: &'a str) -> ConfigResult<Self> {
        let mut parser = Self {
            scanner: Scanner::new(input),
            lookahead: None,
            line: 1,
        };
        parser.lookahead = parser.scan()?;
        Ok(parser)
    }

    fn scan(&mut self) -> ConfigResult<Option<(usize, Token)>> {
        let token = self.scanner.next_token()?;
        Ok(token.map(|t| (self.scanner.line(), t)))
    }

    fn advance(&mut self) -> ConfigResult<Option<Token>> {
        let next = self.scan()?;
        match std::mem::replace(&mut self.lookahead, next) {
            Some((line, token)) => {
                self.line = line;
                Ok(Some(token))
            }
            None => {
                self.line = self.scanner.line();
                Ok(None)
            }
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.lookahead.as_ref().map(|(_, t)| t)
    }

    fn grammar(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::Grammar {
            line: self.line,
            message: message.into(),
        }
    }

    fn unexpected(&self, expecting: &str, found: Option<Token>) -> ConfigError {
        match found {
            Some(token) => self.grammar(format!("expecting {}, found {}", expecting, token)),
            None => self.grammar(format!("expecting {}, found end of input", expecting)),
        }
    }

    fn identifier(&mut self, expecting: &str) -> ConfigResult<String> {
        match self.advance()? {
            Some(Token::Identifier(id)) => Ok(id),
            other => Err(self.unexpected(expecting, other)),
        }
    }

    fn quoted(&mut self, expecting: &str) -> ConfigResult<String> {
        match self.advance()? {
            Some(Token::QuotedString(s)) => Ok(s),
            other => Err(self.unexpected(expecting, other)),
        }
    }

    fn parse(mut self) -> ConfigResult<PoolConfig> {
        let mut config = PoolConfig::new();
        while let Some(token) = self.advance()? {
            match token {
                Token::Reserved(ReservedWord::Pool) => {
                    let site = self.pool()?;
                    let handle = site.handle.clone();
                    config.add(&handle, site);
                }
                other => return Err(self.unexpected("reserved word \"pool\"", Some(other))),
            }
        }
        Ok(config)
    }

    fn pool(&mut self) -> ConfigResult<PoolSite> {
        let handle = self.identifier("a pool handle")?;
        match self.advance()? {
            Some(Token::OpenBrace) => {}
            other => return Err(self.unexpected("an opening brace", other)),
        }

        let mut site = PoolSite::new(handle);
        loop {
            match self.advance()? {
                Some(Token::CloseBrace) => break,
                Some(Token::Reserved(word)) if word != ReservedWord::Pool => {
                    self.attribute(word, &mut site)?;
                    if self.peek() == Some(&Token::Semicolon) {
                        self.advance()?;
                    }
                }
                other => return Err(self.unexpected("a closing brace", other)),
            }
        }
        Ok(site)
    }

    fn attribute(&mut self, word: ReservedWord, site: &mut PoolSite) -> ConfigResult<()> {
        match word {
            ReservedWord::Universe => {
                let universe = self.identifier("a universe name")?;
                let url = self.quoted("a job manager url")?;
                let version = self.quoted("a globus version")?;
                site.job_managers.push(JobManager::new(universe, url, version));
            }
            ReservedWord::Lrc => {
                site.lrcs.push(Lrc::new(self.quoted("an lrc url")?));
            }
            ReservedWord::Gridlaunch => {
                site.grid_launch = Some(self.quoted("a gridlaunch path")?);
            }
            ReservedWord::Workdir => {
                site.work_dir = Some(WorkDir::new(self.quoted("a workdir path")?));
            }
            ReservedWord::Gridftp => {
                let url = self.quoted("a gridftp url")?;
                let version = self.quoted("a globus version")?;
                let server = GridFtpServer::from_url(&url, version)
                    .ok_or_else(|| self.grammar(format!("malformed gridftp url \"{}\"", url)))?;
                site.gridftp_servers.push(server);
            }
            ReservedWord::Profile => {
                let namespace = self.identifier("a profile namespace")?;
                let key = self.quoted("a profile key")?;
                let value = self.quoted("a profile value")?;
                let namespace = namespace.parse().map_err(|_| {
                    self.grammar(format!("unknown profile namespace \"{}\"", namespace))
                })?;
                site.profiles.push(Profile::new(namespace, key, value));
            }
            ReservedWord::Sysinfo => {
                site.sysinfo = Some(self.quoted("a sysinfo string")?);
            }
            ReservedWord::Pool => {
                return Err(self.grammar("pool blocks cannot be nested"));
            }
        }
        Ok(())
    }
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render a [`PoolConfig`] in the pool config text format.
///
/// Handles and universes are bare identifiers in this format; a value that
/// would not scan back as one is rejected with [`ConfigError::InvalidValue`].
pub fn write_pool_config(config: &PoolConfig) -> ConfigResult<String> {
    let mut out = String::new();
    for (i, site) in config.sites().enumerate() {
        check_identifier("pool handle", &site.handle)?;
        for jm in &site.job_managers {
            check_identifier("universe", &jm.universe)?;
        }
        if i > 0 {
            out.push('\n');
        }
        write_pool(&mut out, site)?;
    }
    Ok(out)
}

fn check_identifier(field: &str, value: &str) -> ConfigResult<()> {
    if is_identifier(value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("\"{}\" is not a pool config identifier", value),
        ))
    }
}

fn write_pool(out: &mut String, site: &PoolSite) -> std::fmt::Result {
    writeln!(out, "pool {} {{", site.handle)?;
    if let Some(sysinfo) = &site.sysinfo {
        writeln!(out, "    sysinfo {};", quote(sysinfo))?;
    }
    if let Some(path) = &site.grid_launch {
        writeln!(out, "    gridlaunch {};", quote(path))?;
    }
    if let Some(work_dir) = &site.work_dir {
        writeln!(out, "    workdir {};", quote(&work_dir.path))?;
    }
    for server in &site.gridftp_servers {
        writeln!(
            out,
            "    gridftp {} {};",
            quote(&server.full_url()),
            quote(&server.globus_version)
        )?;
    }
    for jm in &site.job_managers {
        writeln!(
            out,
            "    universe {} {} {};",
            jm.universe,
            quote(&jm.url),
            quote(&jm.globus_version)
        )?;
    }
    for lrc in &site.lrcs {
        writeln!(out, "    lrc {};", quote(&lrc.url))?;
    }
    for profile in &site.profiles {
        writeln!(
            out,
            "    profile {} {} {};",
            profile.namespace,
            quote(&profile.key),
            quote(&profile.value)
        )?;
    }
    out.push_str("}\n");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitecat_core::Namespace;
    use sitecat_core::legacy::{TRANSFER_UNIVERSE, VANILLA_UNIVERSE};

    const SAMPLE: &str = r#"
# two pools
pool isi_viz {
    sysinfo "INTEL32::LINUX"
    gridlaunch "/nfs/vds/bin/kickstart";
    workdir "/scratch";
    gridftp "gsiftp://viz.isi.edu/data/storage" "2.4.3";
    universe vanilla "viz.isi.edu/jobmanager-pbs" "2.4.3";
    universe transfer "viz.isi.edu/jobmanager-fork" "2.4.3";
    lrc "rls://viz.isi.edu";
    profile env "GLOBUS_LOCATION" "/opt/globus";
    profile vds "group" "viz";
}

pool local {
    workdir "/tmp";
}
"#;

    #[test]
    fn test_parse_single_workdir() {
        let config = parse_pool_config(r#"pool isi_viz { workdir "/scratch"; }"#).unwrap();
        assert_eq!(config.len(), 1);
        let site = config.get("isi_viz").unwrap();
        assert_eq!(site.exec_mount_point(), Some("/scratch"));
    }

    #[test]
    fn test_parse_full_pool() {
        let config = parse_pool_config(SAMPLE).unwrap();
        assert_eq!(config.handles().collect::<Vec<_>>(), vec!["isi_viz", "local"]);

        let site = config.get("isi_viz").unwrap();
        assert_eq!(site.sysinfo.as_deref(), Some("INTEL32::LINUX"));
        assert_eq!(site.grid_launch.as_deref(), Some("/nfs/vds/bin/kickstart"));
        assert_eq!(site.gridftp_servers[0].url, "gsiftp://viz.isi.edu");
        assert_eq!(site.gridftp_servers[0].storage_dir, "/data/storage");
        assert_eq!(
            site.select_job_manager(VANILLA_UNIVERSE).unwrap().url,
            "viz.isi.edu/jobmanager-pbs"
        );
        assert!(site.select_job_manager(TRANSFER_UNIVERSE).is_some());
        assert_eq!(site.select_lrc().unwrap().url, "rls://viz.isi.edu");
        assert_eq!(site.profiles.len(), 2);
        assert_eq!(site.profiles[1].namespace, Namespace::Pegasus);
    }

    #[test]
    fn test_unterminated_quote() {
        let result = parse_pool_config(r#"pool x { workdir "/scratch }"#);
        assert!(matches!(result, Err(ConfigError::Lexical { line: 1, .. })));
    }

    #[test]
    fn test_missing_open_brace() {
        let result = parse_pool_config("pool x\n workdir \"/tmp\"; }");
        match result {
            Err(ConfigError::Grammar { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("expecting an opening brace"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_close_brace() {
        let result = parse_pool_config("pool x {\n workdir \"/tmp\";\n");
        match result {
            Err(ConfigError::Grammar { message, .. }) => {
                assert!(message.contains("expecting a closing brace"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_wrong_token_for_attribute() {
        let result = parse_pool_config(r#"pool x { universe "vanilla" "host" "2.4"; }"#);
        assert!(matches!(result, Err(ConfigError::Grammar { .. })));

        let result = parse_pool_config(r#"pool x { profile bogus "k" "v"; }"#);
        assert!(matches!(result, Err(ConfigError::Grammar { .. })));
    }

    #[test]
    fn test_top_level_must_be_pool() {
        let result = parse_pool_config(r#"workdir "/tmp""#);
        assert!(matches!(result, Err(ConfigError::Grammar { line: 1, .. })));
    }

    #[test]
    fn test_duplicate_handles_are_kept() {
        let input = r#"
pool isi { workdir "/a"; }
pool isi { workdir "/b"; }
"#;
        let config = parse_pool_config(input).unwrap();
        assert_eq!(config.len(), 2);
        assert_eq!(config.get("isi").unwrap().exec_mount_point(), Some("/a"));
        let synthetic = config.handles().find(|h| *h != "isi").unwrap();
        assert!(synthetic.starts_with("isi-"));
        assert_eq!(config.get(synthetic).unwrap().exec_mount_point(), Some("/b"));
    }

    #[test]
    fn test_write_then_parse() {
        let config = parse_pool_config(SAMPLE).unwrap();
        let text = write_pool_config(&config).unwrap();
        assert!(text.contains("universe vanilla \"viz.isi.edu/jobmanager-pbs\" \"2.4.3\";"));
        assert!(text.contains("profile pegasus \"group\" \"viz\";"));
        assert_eq!(parse_pool_config(&text).unwrap(), config);
    }

    #[test]
    fn test_write_escapes_quotes() {
        let mut config = PoolConfig::new();
        let mut site = PoolSite::new("odd");
        site.profiles
            .push(Profile::new(Namespace::Env, "MSG", r#"say "hi""#));
        config.add("odd", site);

        let text = write_pool_config(&config).unwrap();
        assert!(text.contains(r#""say \"hi\"""#));
        assert_eq!(parse_pool_config(&text).unwrap(), config);
    }

    #[test]
    fn test_write_rejects_non_identifier_handle() {
        let mut config = PoolConfig::new();
        config.add("isi viz", PoolSite::new("isi viz"));
        assert!(matches!(
            write_pool_config(&config),
            Err(ConfigError::InvalidValue { field, .. }) if field == "pool handle"
        ));

        let mut config = PoolConfig::new();
        let mut site = PoolSite::new("isi");
        site.job_managers.push(JobManager::new("profile", "isi.edu/jobmanager-fork", "2.4"));
        config.add("isi", site);
        assert!(matches!(
            write_pool_config(&config),
            Err(ConfigError::InvalidValue { field, .. }) if field == "universe"
        ));
    }

    #[test]
    fn test_special_characters_round_trip() {
        let mut site = PoolSite::new("isi-viz.edu");
        site.sysinfo = Some("INTEL32::LINUX".to_string());
        site.work_dir = Some(WorkDir::new("/scratch/with space"));
        site.job_managers.push(JobManager::new(
            VANILLA_UNIVERSE,
            "viz.isi.edu/jobmanager-pbs?q=<long>&x='y'",
            "2.4.3",
        ));
        site.lrcs.push(Lrc::new("rls://viz.isi.edu?a=1&b=2"));
        site.profiles
            .push(Profile::new(Namespace::Env, "PAD", "  padded value  "));
        site.profiles
            .push(Profile::new(Namespace::Env, "EXPR", r#"a < b && c\d "e""#));
        let mut config = PoolConfig::new();
        config.add("isi-viz.edu", site);

        let text = write_pool_config(&config).unwrap();
        assert_eq!(parse_pool_config(&text).unwrap(), config);
    }
}
