//! Scripted loader and scanner for unit tests.

use std::{
    cell::Cell,
    collections::HashMap,
    ffi::{CStr, CString, c_int, c_void},
    path::{Path, PathBuf},
    rc::Rc,
};

use micromod_abi::{
    DEFAULT_EXIT_SYMBOL, DEFAULT_INIT_SYMBOL, DEFAULT_NAME_SYMBOL, ModuleEntryFn, STATUS_OK,
};

use crate::{
    adapter::{AdapterError, DynamicLoader, LoadedObject, SymbolAddr},
    scanner::{DirEntry, DirectoryScan, DirectoryScanner, EntryKind, ScanError},
    symbol::ModuleArg,
};

/// Init/exit call counts, passed to modules as their argument.
#[derive(Debug, Default)]
pub(crate) struct CallLog {
    inits: Cell<usize>,
    exits: Cell<usize>,
}

impl CallLog {
    pub(crate) fn arg(&self) -> ModuleArg {
        ModuleArg::new(std::ptr::from_ref(self).cast_mut().cast())
    }

    pub(crate) fn inits(&self) -> usize {
        self.inits.get()
    }

    pub(crate) fn exits(&self) -> usize {
        self.exits.get()
    }
}

fn call_log<'a>(arg: *mut c_void) -> Option<&'a CallLog> {
    // SAFETY: tests only ever pass null or `CallLog::arg`.
    unsafe { arg.cast::<CallLog>().as_ref() }
}

pub(crate) extern "C" fn init_ok(arg: *mut c_void) -> c_int {
    if let Some(log) = call_log(arg) {
        log.inits.set(log.inits.get() + 1);
    }
    STATUS_OK
}

pub(crate) extern "C" fn init_fails(arg: *mut c_void) -> c_int {
    if let Some(log) = call_log(arg) {
        log.inits.set(log.inits.get() + 1);
    }
    7
}

pub(crate) extern "C" fn exit_ok(arg: *mut c_void) -> c_int {
    if let Some(log) = call_log(arg) {
        log.exits.set(log.exits.get() + 1);
    }
    STATUS_OK
}

pub(crate) extern "C" fn exit_fails(arg: *mut c_void) -> c_int {
    if let Some(log) = call_log(arg) {
        log.exits.set(log.exits.get() + 1);
    }
    3
}

thread_local! {
    static COUNTED_EXITS: Cell<usize> = const { Cell::new(0) };
}

/// Exits run on this thread by [`exit_counted`] and [`exit_counted_fails`].
///
/// Counts independently of the module argument, so it also covers
/// teardown with a null argument.
pub(crate) fn counted_exits() -> usize {
    COUNTED_EXITS.with(Cell::get)
}

pub(crate) extern "C" fn exit_counted(_arg: *mut c_void) -> c_int {
    COUNTED_EXITS.with(|count| count.set(count.get() + 1));
    STATUS_OK
}

pub(crate) extern "C" fn exit_counted_fails(_arg: *mut c_void) -> c_int {
    COUNTED_EXITS.with(|count| count.set(count.get() + 1));
    5
}

fn fn_addr(f: ModuleEntryFn) -> SymbolAddr {
    SymbolAddr::new(f as *mut c_void).expect("function pointers are non-null")
}

fn str_addr(s: &'static CStr) -> SymbolAddr {
    SymbolAddr::new(s.as_ptr().cast_mut().cast()).expect("static strings are non-null")
}

fn c_symbol(name: &str) -> CString {
    CString::new(name).expect("test symbols have no NUL")
}

/// Exports of one scripted shared object.
#[derive(Debug, Clone)]
pub(crate) struct MockModule {
    symbols: HashMap<CString, SymbolAddr>,
    fail_close: bool,
}

impl MockModule {
    /// No exports at all.
    pub(crate) fn empty() -> Self {
        Self {
            symbols: HashMap::new(),
            fail_close: false,
        }
    }

    /// Well-formed module under the default symbol names.
    pub(crate) fn valid(name: &'static CStr) -> Self {
        Self::empty()
            .export_name(DEFAULT_NAME_SYMBOL, name)
            .export_fn(DEFAULT_INIT_SYMBOL, init_ok)
            .export_fn(DEFAULT_EXIT_SYMBOL, exit_ok)
    }

    pub(crate) fn export_name(mut self, symbol: &str, name: &'static CStr) -> Self {
        self.symbols.insert(c_symbol(symbol), str_addr(name));
        self
    }

    pub(crate) fn export_fn(mut self, symbol: &str, f: ModuleEntryFn) -> Self {
        self.symbols.insert(c_symbol(symbol), fn_addr(f));
        self
    }

    pub(crate) fn with_init(self, f: ModuleEntryFn) -> Self {
        self.export_fn(DEFAULT_INIT_SYMBOL, f)
    }

    pub(crate) fn with_exit(self, f: ModuleEntryFn) -> Self {
        self.export_fn(DEFAULT_EXIT_SYMBOL, f)
    }

    pub(crate) fn without(mut self, symbol: &str) -> Self {
        self.symbols.remove(&c_symbol(symbol));
        self
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

/// Counts of loader calls shared between a [`MockLoader`] and the test.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    opens: Cell<usize>,
    isolated_opens: Cell<usize>,
    closes: Cell<usize>,
    failed_closes: Cell<usize>,
}

impl Ledger {
    pub(crate) fn opens(&self) -> usize {
        self.opens.get()
    }

    pub(crate) fn isolated_opens(&self) -> usize {
        self.isolated_opens.get()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.get()
    }

    pub(crate) fn failed_closes(&self) -> usize {
        self.failed_closes.get()
    }

    /// Objects opened and not yet closed.
    pub(crate) fn live(&self) -> usize {
        self.opens() - self.closes()
    }
}

/// Loader serving [`MockModule`]s by path.
#[derive(Debug, Default)]
pub(crate) struct MockLoader {
    modules: HashMap<PathBuf, MockModule>,
    ledger: Rc<Ledger>,
}

impl MockLoader {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_module(mut self, path: impl AsRef<Path>, module: MockModule) -> Self {
        self.modules.insert(path.as_ref().to_path_buf(), module);
        self
    }

    pub(crate) fn ledger(&self) -> Rc<Ledger> {
        Rc::clone(&self.ledger)
    }
}

impl DynamicLoader for MockLoader {
    type Object = MockObject;

    fn open(&self, path: &Path, isolate: bool) -> Result<MockObject, AdapterError> {
        let module = self.modules.get(path).ok_or_else(|| {
            AdapterError::Open(format!(
                "{}: cannot open shared object file",
                path.display()
            ))
        })?;

        self.ledger.opens.set(self.ledger.opens.get() + 1);
        if isolate {
            self.ledger
                .isolated_opens
                .set(self.ledger.isolated_opens.get() + 1);
        }

        Ok(MockObject {
            symbols: module.symbols.clone(),
            fail_close: module.fail_close,
            open: true,
            ledger: Rc::clone(&self.ledger),
        })
    }
}

#[derive(Debug)]
pub(crate) struct MockObject {
    symbols: HashMap<CString, SymbolAddr>,
    fail_close: bool,
    open: bool,
    ledger: Rc<Ledger>,
}

impl LoadedObject for MockObject {
    fn resolve(&self, symbol: &CStr) -> Result<SymbolAddr, AdapterError> {
        assert!(self.open, "resolve on a closed object");
        self.symbols
            .get(symbol)
            .copied()
            .ok_or_else(|| AdapterError::SymbolNotFound(symbol.to_string_lossy().into_owned()))
    }

    fn close(&mut self) -> Result<(), AdapterError> {
        if !self.open {
            return Ok(());
        }
        if self.fail_close {
            self.ledger
                .failed_closes
                .set(self.ledger.failed_closes.get() + 1);
            return Err(AdapterError::Close("mock close failure".to_string()));
        }
        self.open = false;
        self.ledger.closes.set(self.ledger.closes.get() + 1);
        Ok(())
    }
}

/// Scanner returning a fixed entry list.
#[derive(Debug, Default)]
pub(crate) struct MockScanner {
    entries: Vec<Result<DirEntry, ScanError>>,
    fail_open: bool,
    fail_close: bool,
    closed: Rc<Cell<bool>>,
}

impl MockScanner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn entry(mut self, path: &str, kind: EntryKind) -> Self {
        self.entries.push(Ok(DirEntry {
            path: PathBuf::from(path),
            kind,
        }));
        self
    }

    pub(crate) fn file(self, path: &str) -> Self {
        self.entry(path, EntryKind::File)
    }

    pub(crate) fn unreadable(mut self) -> Self {
        self.entries
            .push(Err(ScanError("directory vanished".to_string())));
        self
    }

    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub(crate) fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Set once a scan from this scanner has been closed.
    pub(crate) fn closed(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.closed)
    }
}

impl DirectoryScanner for MockScanner {
    type Scan = MockScan;

    fn open(&self, _dir: &Path) -> Result<MockScan, ScanError> {
        if self.fail_open {
            return Err(ScanError("permission denied".to_string()));
        }
        Ok(MockScan {
            entries: self.entries.clone().into_iter(),
            fail_close: self.fail_close,
            closed: Rc::clone(&self.closed),
        })
    }
}

pub(crate) struct MockScan {
    entries: std::vec::IntoIter<Result<DirEntry, ScanError>>,
    fail_close: bool,
    closed: Rc<Cell<bool>>,
}

impl Iterator for MockScan {
    type Item = Result<DirEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

impl DirectoryScan for MockScan {
    fn close(self) -> Result<(), ScanError> {
        self.closed.set(true);
        if self.fail_close {
            Err(ScanError("close failed".to_string()))
        } else {
            Ok(())
        }
    }
}
