use std::{
    io::Write,
    process::{Command, Stdio},
    rc::Rc,
};

use crate::{
    dispatch::FxIndexMap,
    error::{Error, Result},
    function::{Arguments, Payload, Procedure, Signature},
    identifier::Identifier,
};

/// Reads callables out of one kind of source.
pub trait SourceAdapter {
    fn name(&self) -> &'static str;

    /// Whether `identifier` looks like a source of this kind. Accepting does
    /// not guarantee the source can be read.
    fn accepts(&self, identifier: &Identifier) -> bool;

    /// Parameters of the callable `identifier` designates within `source`
    fn extract_parameters(&self, identifier: &Identifier, source: &[u8]) -> Result<Signature>;

    /// The revision token the source currently declares, if any
    fn extract_version(&self, _identifier: &Identifier, _source: &[u8]) -> Result<Option<String>> {
        Ok(None)
    }

    /// Runs the callable with fully resolved keyword arguments
    fn run(&self, identifier: &Identifier, source: &[u8], args: &Arguments) -> Result<Payload>;
}

/// Adapters in the order the loader tries them
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: FxIndexMap<&'static str, Rc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    /// Appends `adapter`; registering a name twice replaces the earlier
    /// adapter in place
    pub fn register<A: SourceAdapter + 'static>(&mut self, adapter: A) {
        self.adapters.insert(adapter.name(), Rc::new(adapter));
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Rc<dyn SourceAdapter>> {
        self.adapters.get(name)
    }

    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.adapters.keys().copied()
    }

    /// Adapters accepting `identifier`, in registration order
    pub fn accepting<'a>(
        &'a self,
        identifier: &'a Identifier,
    ) -> impl Iterator<Item = &'a Rc<dyn SourceAdapter>> + 'a {
        self.adapters.values().filter(move |a| a.accepts(identifier))
    }
}

/// The procedure of a remote callable: every call is forwarded to the adapter
/// together with the source bytes fetched at load time
pub(crate) struct RemoteProcedure {
    pub(crate) name: String,
    pub(crate) signature: Signature,
    pub(crate) identifier: Identifier,
    pub(crate) source: Rc<[u8]>,
    pub(crate) adapter: Rc<dyn SourceAdapter>,
}

impl Procedure for RemoteProcedure {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn call(&self, args: &Arguments) -> anyhow::Result<Payload> {
        log::info!("running {} through {}", self.identifier, self.adapter.name());
        Ok(self.adapter.run(&self.identifier, &self.source, args)?)
    }
}

/// Spawns `command` followed by `extra_args`, feeds `stdin` and parses the
/// standard output as JSON. A non-zero exit is reported with the standard
/// error of the child.
pub(crate) fn run_json_command(
    command: &[String],
    extra_args: &[&str],
    stdin: &[u8],
    location: &Identifier,
) -> Result<Payload> {
    let Some((program, args)) = command.split_first() else {
        return Err(Error::adapter(location, "no command configured"));
    };
    log::debug!("spawning {program} {args:?} {extra_args:?}");
    let mut child = Command::new(program)
        .args(args)
        .args(extra_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::adapter(location, format!("can not spawn {program}: {e}")))?;

    // the child may start writing before it has read all of its input
    let writer = child.stdin.take().map(|mut pipe| {
        let input = stdin.to_vec();
        std::thread::spawn(move || pipe.write_all(&input))
    });
    let output = child.wait_with_output()?;
    let written = writer.map(|w| w.join());

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::adapter(
            location,
            format!("{program} exited with {}: {}", output.status, stderr.trim()),
        ));
    }
    match written {
        Some(Ok(result)) => result?,
        Some(Err(_)) => return Err(Error::adapter(location, "stdin writer panicked")),
        None => (),
    }
    serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::adapter(location, format!("output of {program} is not JSON: {e}")))
}
