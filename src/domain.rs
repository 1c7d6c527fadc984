use std::fmt;
use std::str::FromStr;

use crate::error::CanvasError;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Store-assigned identifier of a [`Project`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(pub i64);

/// Store-assigned identifier of a [`CanvasNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a project's content is held.
///
/// `Markdown` projects are backed by an external file the host manages; the
/// store only keeps the opaque handle it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectType {
    #[default]
    Canvas,
    Markdown,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Canvas => "canvas",
            ProjectType::Markdown => "markdown",
        }
    }
}

impl FromStr for ProjectType {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canvas" => Ok(ProjectType::Canvas),
            "markdown" => Ok(ProjectType::Markdown),
            other => Err(CanvasError::Corrupt(format!("unknown project type '{other}'"))),
        }
    }
}

/// A named collection of captured nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub project_type: ProjectType,
    pub updated_at: i64,
    pub is_inbox: bool,
    pub file_handle: Option<Vec<u8>>,
}

/// Fields for a project that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub project_type: ProjectType,
    pub updated_at: i64,
    pub file_handle: Option<Vec<u8>>,
}

impl NewProject {
    pub fn new(name: impl Into<String>, project_type: ProjectType) -> Self {
        NewProject {
            name: name.into(),
            project_type,
            updated_at: now_millis(),
            file_handle: None,
        }
    }
}

/// A partial project update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub updated_at: Option<i64>,
    /// `Some(None)` clears the handle.
    pub file_handle: Option<Option<Vec<u8>>>,
}

impl ProjectPatch {
    pub fn touch(at: i64) -> Self {
        ProjectPatch {
            updated_at: Some(at),
            ..Default::default()
        }
    }
}

impl Project {
    /// Merges `patch` into this project in memory.
    pub fn apply(&mut self, patch: ProjectPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(at) = patch.updated_at {
            self.updated_at = at;
        }
        if let Some(handle) = patch.file_handle {
            self.file_handle = handle;
        }
    }
}

/// Which kind of capture a node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Text,
    File,
    Link,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Text => "text",
            NodeType::File => "file",
            NodeType::Link => "link",
        }
    }
}

impl FromStr for NodeType {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(NodeType::Text),
            "file" => Ok(NodeType::File),
            "link" => Ok(NodeType::Link),
            other => Err(CanvasError::Corrupt(format!("unknown node type '{other}'"))),
        }
    }
}

/// A single captured item on a project's canvas.
///
/// Which optional fields carry meaning depends on `node_type`:
/// - `Text`: `text` plus the version triple `original_text`, `edited_text`,
///   `has_edited`
/// - `File`: `file_data` and `file_name`
/// - `Link`: `url`, with `text` as the display label
///
/// `source_url` and `source_icon` record where any capture came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasNode {
    pub id: NodeId,
    pub project_id: ProjectId,
    pub node_type: NodeType,
    pub order: i64,
    pub text: Option<String>,
    pub original_text: Option<String>,
    pub edited_text: Option<String>,
    pub has_edited: bool,
    pub file_data: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub source_icon: Option<String>,
    pub created_at: i64,
}

/// Content of a node before the store has placed it.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraft {
    pub node_type: NodeType,
    pub text: Option<String>,
    pub original_text: Option<String>,
    pub edited_text: Option<String>,
    pub has_edited: bool,
    pub file_data: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub url: Option<String>,
    pub source_url: Option<String>,
    pub source_icon: Option<String>,
    pub created_at: i64,
}

impl NodeDraft {
    fn empty(node_type: NodeType) -> Self {
        NodeDraft {
            node_type,
            text: None,
            original_text: None,
            edited_text: None,
            has_edited: false,
            file_data: None,
            file_name: None,
            url: None,
            source_url: None,
            source_icon: None,
            created_at: now_millis(),
        }
    }

    /// A captured text snippet. The captured text doubles as the original
    /// version until the node is first edited.
    pub fn text(
        text: impl Into<String>,
        source_url: Option<String>,
        source_icon: Option<String>,
    ) -> Self {
        let text = text.into();
        NodeDraft {
            original_text: Some(text.clone()),
            text: Some(text),
            source_url,
            source_icon,
            ..Self::empty(NodeType::Text)
        }
    }

    /// A captured image.
    pub fn image(
        file_data: Vec<u8>,
        file_name: impl Into<String>,
        source_url: Option<String>,
    ) -> Self {
        NodeDraft {
            file_data: Some(file_data),
            file_name: Some(file_name.into()),
            source_url,
            ..Self::empty(NodeType::File)
        }
    }

    /// A captured link; `title` becomes the display label.
    pub fn link(url: impl Into<String>, title: Option<String>, source_icon: Option<String>) -> Self {
        NodeDraft {
            url: Some(url.into()),
            text: title,
            source_icon,
            ..Self::empty(NodeType::Link)
        }
    }

    /// Attaches the draft to a project at a given position.
    pub fn place(self, id: NodeId, project_id: ProjectId, order: i64) -> CanvasNode {
        CanvasNode {
            id,
            project_id,
            node_type: self.node_type,
            order,
            text: self.text,
            original_text: self.original_text,
            edited_text: self.edited_text,
            has_edited: self.has_edited,
            file_data: self.file_data,
            file_name: self.file_name,
            url: self.url,
            source_url: self.source_url,
            source_icon: self.source_icon,
            created_at: self.created_at,
        }
    }
}

/// A partial node update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub order: Option<i64>,
    pub text: Option<String>,
    pub original_text: Option<String>,
    pub edited_text: Option<String>,
    pub has_edited: Option<bool>,
}

impl CanvasNode {
    pub fn apply(&mut self, patch: NodePatch) {
        if let Some(order) = patch.order {
            self.order = order;
        }
        if let Some(text) = patch.text {
            self.text = Some(text);
        }
        if let Some(original) = patch.original_text {
            self.original_text = Some(original);
        }
        if let Some(edited) = patch.edited_text {
            self.edited_text = Some(edited);
        }
        if let Some(flag) = patch.has_edited {
            self.has_edited = flag;
        }
    }

    /// Strips placement, keeping content and provenance.
    pub fn into_draft(self) -> NodeDraft {
        NodeDraft {
            node_type: self.node_type,
            text: self.text,
            original_text: self.original_text,
            edited_text: self.edited_text,
            has_edited: self.has_edited,
            file_data: self.file_data,
            file_name: self.file_name,
            url: self.url,
            source_url: self.source_url,
            source_icon: self.source_icon,
            created_at: self.created_at,
        }
    }
}

/// The two versions a text node can expose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextVersions {
    pub original: Option<String>,
    /// `None` until the node has been edited.
    pub edited: Option<String>,
}

/// A project together with how many nodes it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub project: Project,
    pub node_count: u64,
}
