//! MemoryDrive - an in-memory, Drive-shaped [`RemoteAccessor`].

use canopy_engine::{
    decode, mime, AccessConfig, CallClass, ErrorKind, ItemRecord, RemoteAccessor, RemoteError,
    RemoteResult,
};
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Items per `list_children` page unless configured otherwise.
const DEFAULT_PAGE_SIZE: usize = 100;

/// 2025-01-01T00:00:00Z, where the store clock starts.
const CLOCK_START: i64 = 1_735_689_600;

/// A remote call the store can log and fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    ListChildren,
    CreateFolder,
    Rename,
    Move,
    Copy,
    Trash,
    DeletePermanently,
    Upload,
    Download,
}

impl Method {
    /// Which family of request parameters the call carries.
    pub fn class(self) -> CallClass {
        match self {
            Method::Get | Method::Download => CallClass::Get,
            Method::ListChildren => CallClass::List,
            _ => CallClass::Write,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "get",
            Method::ListChildren => "list_children",
            Method::CreateFolder => "create_folder",
            Method::Rename => "rename",
            Method::Move => "move",
            Method::Copy => "copy",
            Method::Trash => "trash",
            Method::DeletePermanently => "delete_permanently",
            Method::Upload => "upload",
            Method::Download => "download",
        };
        f.write_str(name)
    }
}

/// One logged call, including calls that were made to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub method: Method,
    /// Item id, or parent id for creating calls
    pub target: String,
    /// Request parameters the access config adds to this call
    pub params: Vec<(&'static str, &'static str)>,
}

#[derive(Debug, Clone)]
struct Fault {
    method: Method,
    /// Matching calls to let through before failing
    skip: usize,
    /// Failures left to hand out
    remaining: usize,
    error: RemoteError,
}

#[derive(Debug)]
struct State {
    /// Raw file resources by id
    files: BTreeMap<String, Value>,
    contents: HashMap<String, Vec<u8>>,
    next_id: u64,
    now: DateTime<Utc>,
    faults: Vec<Fault>,
    calls: Vec<Call>,
}

/// An in-memory remote store.
///
/// Ids minted by the store are `mem-1`, `mem-2`, ... and every write moves the
/// store clock forward one second, so runs are reproducible.
#[derive(Debug)]
pub struct MemoryDrive {
    config: AccessConfig,
    page_size: usize,
    state: RefCell<State>,
}

impl MemoryDrive {
    pub fn new(config: AccessConfig) -> Self {
        Self {
            config,
            page_size: DEFAULT_PAGE_SIZE,
            state: RefCell::new(State {
                files: BTreeMap::new(),
                contents: HashMap::new(),
                next_id: 0,
                now: Utc.timestamp_opt(CLOCK_START, 0).single().unwrap_or_default(),
                faults: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    // ========================================================================
    // Seeding and inspection
    // ========================================================================

    /// Add a folder. `parent` of `None` makes a top-level folder.
    pub fn seed_folder(&self, id: &str, name: &str, parent: Option<&str>) {
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        let parents: Vec<&str> = parent.into_iter().collect();
        state.files.insert(
            id.to_string(),
            json!({
                "id": id,
                "name": name,
                "mimeType": mime::FOLDER,
                "parents": parents,
                "trashed": false,
                "createdTime": now,
                "modifiedTime": now,
            }),
        );
    }

    /// Add a file with content under `parent`.
    pub fn seed_file(&self, id: &str, name: &str, mime_type: &str, parent: &str, content: &[u8]) {
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        state.files.insert(
            id.to_string(),
            json!({
                "id": id,
                "name": name,
                "mimeType": mime_type,
                "parents": [parent],
                "trashed": false,
                "createdTime": now,
                "modifiedTime": now,
                "size": content.len().to_string(),
            }),
        );
        state.contents.insert(id.to_string(), content.to_vec());
    }

    /// Store a payload verbatim, keyed by its `id` field.
    ///
    /// The payload is not checked, which makes it possible to plant resources
    /// the decoder will reject.
    pub fn insert_raw(&self, payload: Value) -> Option<String> {
        let id = payload.get("id")?.as_str()?.to_string();
        self.state.borrow_mut().files.insert(id.clone(), payload);
        Some(id)
    }

    /// Flip an item's trashed flag without going through a call.
    pub fn set_trashed(&self, id: &str, trashed: bool) -> bool {
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        match state.files.get_mut(id) {
            Some(file) => {
                set(file, "trashed", json!(trashed));
                set(file, "modifiedTime", json!(now));
                true
            }
            None => false,
        }
    }

    /// Bump an item's modified time, as a concurrent edit would.
    pub fn touch(&self, id: &str) -> bool {
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        match state.files.get_mut(id) {
            Some(file) => {
                set(file, "modifiedTime", json!(now));
                true
            }
            None => false,
        }
    }

    /// Decoded view of an item, trashed or not.
    pub fn record(&self, id: &str) -> Option<ItemRecord> {
        let state = self.state.borrow();
        decode::file_resource(state.files.get(id)?).ok()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.borrow().files.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.state.borrow().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn content(&self, id: &str) -> Option<Vec<u8>> {
        self.state.borrow().contents.get(id).cloned()
    }

    /// Sorted names of the non-trashed children of `parent`.
    pub fn names_in(&self, parent: &str) -> Vec<String> {
        let state = self.state.borrow();
        let mut names: Vec<String> = state
            .children(parent)
            .map(|file| str_field(file, "name").to_string())
            .collect();
        names.sort();
        names
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Targets of the logged calls to `method`, in call order.
    pub fn calls_to(&self, method: Method) -> Vec<String> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|call| call.method == method)
            .map(|call| call.target.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Fail the next call to `method` with `error`.
    pub fn fail_next(&self, method: Method, error: RemoteError) {
        self.fail_after(method, 0, 1, error);
    }

    /// Fail the next `times` calls to `method`.
    pub fn fail_times(&self, method: Method, times: usize, error: RemoteError) {
        self.fail_after(method, 0, times, error);
    }

    /// Let `skip` calls to `method` through, then fail the following `times`.
    pub fn fail_after(&self, method: Method, skip: usize, times: usize, error: RemoteError) {
        if times == 0 {
            return;
        }
        self.state.borrow_mut().faults.push(Fault {
            method,
            skip,
            remaining: times,
            error,
        });
    }

    /// Log a call and hand out a scripted failure if one is due.
    fn begin(&self, method: Method, target: &str) -> RemoteResult<()> {
        let mut state = self.state.borrow_mut();
        state.calls.push(Call {
            method,
            target: target.to_string(),
            params: self.config.request_params(method.class()),
        });
        debug!(%method, item = target, "drive call");

        let Some(pos) = state.faults.iter().position(|f| f.method == method) else {
            return Ok(());
        };
        let fault = &mut state.faults[pos];
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        fault.remaining -= 1;
        let error = fault.error.clone();
        if fault.remaining == 0 {
            state.faults.remove(pos);
        }
        debug!(%method, item = target, error = %error, "scripted failure");
        Err(error)
    }
}

impl State {
    fn tick(&mut self) -> String {
        self.now += Duration::seconds(1);
        self.now.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn mint_id(&mut self) -> String {
        self.next_id += 1;
        format!("mem-{}", self.next_id)
    }

    fn file(&self, id: &str) -> RemoteResult<&Value> {
        self.files.get(id).ok_or_else(|| not_found(id))
    }

    fn file_mut(&mut self, id: &str) -> RemoteResult<&mut Value> {
        self.files.get_mut(id).ok_or_else(|| not_found(id))
    }

    fn folder(&self, id: &str) -> RemoteResult<&Value> {
        let file = self.file(id)?;
        if !mime::is_folder(str_field(file, "mimeType")) {
            return Err(api_error(
                400,
                "invalidParent",
                format!("Parent is not a folder: {id}"),
            ));
        }
        Ok(file)
    }

    /// Non-trashed resources listing `parent` among their parents.
    fn children<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.files
            .values()
            .filter(move |file| !is_trashed(file) && parents_of(file).contains(&parent))
    }

    /// Every item below `id`, trashed or not.
    fn descendants(&self, id: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(parent) = queue.pop_front() {
            for (child, file) in &self.files {
                if parents_of(file).contains(&parent.as_str()) && found.insert(child.clone()) {
                    queue.push_back(child.clone());
                }
            }
        }
        found
    }

    /// One `files.list` page of `parent`'s children.
    fn page(&self, parent: &str, token: Option<&str>, page_size: usize) -> RemoteResult<Value> {
        self.file(parent)?;
        let offset = match token {
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                api_error(400, "invalidPageToken", format!("Invalid page token: {raw}"))
            })?,
            None => 0,
        };

        let mut children: Vec<&Value> = self.children(parent).collect();
        children.sort_by(|a, b| {
            (str_field(a, "name"), str_field(a, "id")).cmp(&(str_field(b, "name"), str_field(b, "id")))
        });

        let end = (offset + page_size).min(children.len());
        let files = children.get(offset..end).unwrap_or_default();
        let next = (end < children.len()).then(|| end.to_string());
        Ok(json!({ "files": files, "nextPageToken": next }))
    }
}

impl RemoteAccessor for MemoryDrive {
    fn get(&self, id: &str) -> RemoteResult<ItemRecord> {
        self.begin(Method::Get, id)?;
        let state = self.state.borrow();
        Ok(decode::file_resource(state.file(id)?)?)
    }

    fn list_children(&self, parent_id: &str) -> RemoteResult<Vec<ItemRecord>> {
        let mut records = Vec::new();
        let mut token: Option<String> = None;
        loop {
            self.begin(Method::ListChildren, parent_id)?;
            let page = self
                .state
                .borrow()
                .page(parent_id, token.as_deref(), self.page_size)?;
            let (files, next) = decode::file_list(&page)?;
            records.extend(files);
            match next {
                Some(next) => token = Some(next),
                None => return Ok(records),
            }
        }
    }

    fn create_folder(&self, name: &str, parent_id: &str) -> RemoteResult<ItemRecord> {
        self.begin(Method::CreateFolder, parent_id)?;
        let mut state = self.state.borrow_mut();
        state.folder(parent_id)?;

        let id = state.mint_id();
        let now = state.tick();
        let file = json!({
            "id": id,
            "name": name,
            "mimeType": mime::FOLDER,
            "parents": [parent_id],
            "trashed": false,
            "createdTime": now,
            "modifiedTime": now,
        });
        let record = decode::file_resource(&file)?;
        state.files.insert(id, file);
        Ok(record)
    }

    fn rename(&self, id: &str, new_name: &str) -> RemoteResult<ItemRecord> {
        self.begin(Method::Rename, id)?;
        let mut state = self.state.borrow_mut();
        state.file(id)?;
        let now = state.tick();
        let file = state.file_mut(id)?;
        set(file, "name", json!(new_name));
        set(file, "modifiedTime", json!(now));
        Ok(decode::file_resource(file)?)
    }

    fn move_item(&self, id: &str, new_parent_id: &str) -> RemoteResult<ItemRecord> {
        self.begin(Method::Move, id)?;
        let mut state = self.state.borrow_mut();
        state.file(id)?;
        state.folder(new_parent_id)?;
        if id == new_parent_id || state.descendants(id).contains(new_parent_id) {
            return Err(api_error(
                400,
                "cannotMoveIntoDescendant",
                format!("Cannot move {id} into its own subtree"),
            ));
        }

        let now = state.tick();
        let file = state.file_mut(id)?;
        set(file, "parents", json!([new_parent_id]));
        set(file, "modifiedTime", json!(now));
        Ok(decode::file_resource(file)?)
    }

    fn copy(
        &self,
        id: &str,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> RemoteResult<ItemRecord> {
        self.begin(Method::Copy, id)?;
        let mut state = self.state.borrow_mut();
        let mut file = state.file(id)?.clone();
        if mime::is_folder(str_field(&file, "mimeType")) {
            return Err(api_error(
                403,
                "cannotCopyFolder",
                "Folders cannot be copied".to_string(),
            ));
        }
        state.folder(new_parent_id)?;

        let copy_id = state.mint_id();
        let now = state.tick();
        set(&mut file, "id", json!(copy_id));
        set(&mut file, "parents", json!([new_parent_id]));
        set(&mut file, "trashed", json!(false));
        set(&mut file, "createdTime", json!(now));
        set(&mut file, "modifiedTime", json!(now));
        if let Some(name) = new_name {
            set(&mut file, "name", json!(name));
        }

        let record = decode::file_resource(&file)?;
        if let Some(content) = state.contents.get(id).cloned() {
            state.contents.insert(copy_id.clone(), content);
        }
        state.files.insert(copy_id, file);
        Ok(record)
    }

    fn trash(&self, id: &str) -> RemoteResult<()> {
        self.begin(Method::Trash, id)?;
        let mut state = self.state.borrow_mut();
        state.file(id)?;
        let now = state.tick();

        let mut affected = state.descendants(id);
        affected.insert(id.to_string());
        for item in &affected {
            if let Some(file) = state.files.get_mut(item) {
                set(file, "trashed", json!(true));
                set(file, "modifiedTime", json!(now));
            }
        }
        Ok(())
    }

    fn delete_permanently(&self, id: &str) -> RemoteResult<()> {
        self.begin(Method::DeletePermanently, id)?;
        let mut state = self.state.borrow_mut();
        state.file(id)?;

        // Items survive while any of their parents does.
        let mut doomed = BTreeSet::from([id.to_string()]);
        loop {
            let orphaned: Vec<String> = state
                .files
                .iter()
                .filter(|(item, file)| {
                    let parents = parents_of(file);
                    !doomed.contains(*item)
                        && !parents.is_empty()
                        && parents.iter().all(|p| doomed.contains(*p))
                })
                .map(|(item, _)| item.clone())
                .collect();
            if orphaned.is_empty() {
                break;
            }
            doomed.extend(orphaned);
        }

        for item in &doomed {
            state.files.remove(item);
            state.contents.remove(item);
        }
        for file in state.files.values_mut() {
            let parents: Vec<String> = parents_of(file)
                .into_iter()
                .filter(|p| !doomed.contains(*p))
                .map(str::to_string)
                .collect();
            set(file, "parents", json!(parents));
        }
        Ok(())
    }

    fn upload_file(
        &self,
        local_path: &Path,
        parent_id: &str,
        name: Option<&str>,
    ) -> RemoteResult<ItemRecord> {
        self.begin(Method::Upload, parent_id)?;
        let content = fs::read(local_path).map_err(|err| {
            RemoteError::new(
                ErrorKind::InvalidArgument,
                format!("cannot read {}: {err}", local_path.display()),
            )
        })?;
        let name = match name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    RemoteError::new(ErrorKind::InvalidArgument, "upload needs a file name")
                })?,
        };

        let mut state = self.state.borrow_mut();
        state.folder(parent_id)?;
        let id = state.mint_id();
        let now = state.tick();
        let file = json!({
            "id": id,
            "name": name,
            "mimeType": mime::OCTET_STREAM,
            "parents": [parent_id],
            "trashed": false,
            "createdTime": now,
            "modifiedTime": now,
            "size": content.len().to_string(),
        });
        let record = decode::file_resource(&file)?;
        state.files.insert(id.clone(), file);
        state.contents.insert(id, content);
        Ok(record)
    }

    fn download_file(&self, id: &str, local_path: &Path, overwrite: bool) -> RemoteResult<()> {
        self.begin(Method::Download, id)?;
        if !overwrite && local_path.exists() {
            return Err(RemoteError::new(
                ErrorKind::InvalidArgument,
                format!(
                    "destination {} exists and overwrite is off",
                    local_path.display()
                ),
            ));
        }

        let state = self.state.borrow();
        let mime_type = str_field(state.file(id)?, "mimeType");
        if !mime::is_downloadable(mime_type) {
            return Err(RemoteError::new(
                ErrorKind::InvalidArgument,
                format!("{mime_type} has no downloadable content"),
            ));
        }
        let content = state.contents.get(id).map(Vec::as_slice).unwrap_or_default();

        if let Some(dir) = local_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|err| local_write_error(local_path, err))?;
        }
        fs::write(local_path, content).map_err(|err| local_write_error(local_path, err))
    }
}

/// Build a failure the way the real service reports one.
fn api_error(status: u16, reason: &str, message: String) -> RemoteError {
    decode::http_error(
        status,
        &json!({
            "error": {
                "code": status,
                "message": message,
                "errors": [{ "reason": reason, "message": message }],
            }
        }),
    )
}

fn not_found(id: &str) -> RemoteError {
    api_error(404, "notFound", format!("File not found: {id}"))
}

fn local_write_error(path: &Path, err: std::io::Error) -> RemoteError {
    RemoteError::new(
        ErrorKind::Api,
        format!("cannot write {}: {err}", path.display()),
    )
}

fn set(file: &mut Value, field: &str, value: Value) {
    if let Value::Object(obj) = file {
        obj.insert(field.to_string(), value);
    }
}

fn str_field<'a>(file: &'a Value, field: &str) -> &'a str {
    file.get(field).and_then(Value::as_str).unwrap_or_default()
}

fn is_trashed(file: &Value) -> bool {
    file.get("trashed").and_then(Value::as_bool).unwrap_or(false)
}

fn parents_of(file: &Value) -> Vec<&str> {
    file.get("parents")
        .and_then(Value::as_array)
        .map(|parents| parents.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}
