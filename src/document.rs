use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::errors::ApplicationError;
use crate::model::FnModel;
use crate::scope::{Scope, ScopeContext};
use crate::settings::ItemSettings;
use crate::transform::{parse, ParsedContent};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind
{
    Empty,
    Function,
    Variable,
    Point,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ItemStatus
{
    /// No text.
    Empty,
    Ready,
    /// Failed on a symbol that is not defined yet; retried whenever scope grows.
    Pending(ApplicationError),
    /// Retried only when the text changes.
    Failed(ApplicationError),
    /// A definition this item depended on was deleted. Needs an explicit `reevaluate`.
    Detached,
}

impl ItemStatus
{
    pub fn error(&self) -> Option<&ApplicationError>
    {
        match self
        {
            ItemStatus::Pending(e) | ItemStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool
    {
        matches!(self, ItemStatus::Ready)
    }

    pub fn is_pending(&self) -> bool
    {
        matches!(self, ItemStatus::Pending(_))
    }
}

/// What an item currently contributes to the scope context.
#[derive(Clone, Debug, PartialEq)]
struct Registration
{
    /// The defined name, or `#id` for items that define nothing.
    key: String,
    dependencies: Vec<String>,
    /// Text the registered definition was parsed from.
    text: String,
}

/// One line of the expression list.
#[derive(Clone, Debug)]
pub struct ExpressionItem
{
    id: ItemId,
    kind: ItemKind,
    raw_text: String,
    parsed: Option<ParsedContent>,
    status: ItemStatus,
    settings: Option<ItemSettings>,
    focused: bool,
    model: Option<Rc<FnModel>>,
    registration: Option<Registration>,
    revision: u64,
}

impl ExpressionItem
{
    fn new(id: ItemId) -> ExpressionItem
    {
        ExpressionItem {
            id,
            kind: ItemKind::Empty,
            raw_text: String::new(),
            parsed: None,
            status: ItemStatus::Empty,
            settings: None,
            focused: false,
            model: None,
            registration: None,
            revision: 0,
        }
    }

    pub fn id(&self) -> ItemId
    {
        self.id
    }

    pub fn kind(&self) -> ItemKind
    {
        self.kind
    }

    pub fn raw_text(&self) -> &str
    {
        &self.raw_text
    }

    pub fn parsed(&self) -> Option<&ParsedContent>
    {
        self.parsed.as_ref()
    }

    pub fn status(&self) -> &ItemStatus
    {
        &self.status
    }

    pub fn settings(&self) -> Option<&ItemSettings>
    {
        self.settings.as_ref()
    }

    pub fn focused(&self) -> bool
    {
        self.focused
    }

    /// Compiled function, for ready function items.
    pub fn model(&self) -> Option<&Rc<FnModel>>
    {
        self.model.as_ref()
    }

    /// Bumped whenever the parsed content or the model changes.
    pub fn revision(&self) -> u64
    {
        self.revision
    }
}

/// Result of (re)installing one item's definition.
struct Outcome
{
    /// Scope names whose entries were added, replaced or removed.
    changed: Vec<String>,
    error: Option<ApplicationError>,
}

/// The expression list together with the scope it defines.
///
/// Every mutation settles fully before returning: dependents of a changed
/// name are re-evaluated and pending items are retried until nothing changes.
#[derive(Debug, Default)]
pub struct Document
{
    items: Vec<ExpressionItem>,
    context: ScopeContext,
    /// Which item defines each scope name.
    owners: HashMap<String, ItemId>,
    next_id: u32,
    revision: u64,
}

fn anonymous_key(id: ItemId) -> String
{
    format!("#{}", id.0)
}

impl Document
{
    pub fn new() -> Document
    {
        Document::default()
    }

    pub fn items(&self) -> &[ExpressionItem]
    {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&ExpressionItem>
    {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn scope(&self) -> &Scope
    {
        &self.context.scope
    }

    pub fn context(&self) -> &ScopeContext
    {
        &self.context
    }

    /// Current value of the variable `name`.
    pub fn value_of(&self, name: &str) -> Option<f64>
    {
        self.context.scope.value_of(name)
    }

    fn index_of(&self, id: ItemId) -> Result<usize, ApplicationError>
    {
        self.items.iter()
            .position(|item| item.id == id)
            .ok_or_else(|| ApplicationError::semantic(format!("no expression with id {}", id.0)))
    }

    fn item_for_key(&self, key: &str) -> Option<usize>
    {
        let id = match key.strip_prefix('#')
        {
            Some(raw) => ItemId(raw.parse().ok()?),
            None => *self.owners.get(key)?,
        };
        self.items.iter().position(|item| item.id == id)
    }

    fn touch(&mut self, idx: usize)
    {
        self.revision += 1;
        self.items[idx].revision = self.revision;
    }

    /// Appends an empty item.
    pub fn insert(&mut self) -> ItemId
    {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items.push(ExpressionItem::new(id));
        id
    }

    /// Re-parses the item from `text` and settles the document.
    ///
    /// # Example
    /// ```
    /// use geqsplot::document::Document;
    ///
    /// let mut doc = Document::new();
    /// let a = doc.insert();
    /// let b = doc.insert();
    ///
    /// doc.set_text(b, "b = 2a").unwrap_err(); // a is not defined yet
    /// doc.set_text(a, "a = 4").unwrap();
    ///
    /// assert_eq!(doc.value_of("b"), Some(8.0));
    /// ```
    pub fn set_text(&mut self, id: ItemId, text: &str) -> Result<(), ApplicationError>
    {
        let idx = self.index_of(id)?;
        self.items[idx].raw_text = text.to_owned();
        let outcome = self.evaluate_text(idx, text.to_owned());
        self.settle(&outcome.changed);
        outcome.error.map_or(Ok(()), Err)
    }

    /// Installs content that was parsed by the caller and settles the document.
    ///
    /// The item's text becomes the written-out form of `parsed`, so later
    /// upstream changes re-evaluate the committed definition.
    pub fn commit(&mut self, id: ItemId, parsed: ParsedContent) -> Result<(), ApplicationError>
    {
        let idx = self.index_of(id)?;
        let text = parsed.to_string();
        self.items[idx].raw_text = text.clone();
        let outcome = self.install(idx, parsed, text);
        self.settle(&outcome.changed);
        outcome.error.map_or(Ok(()), Err)
    }

    /// Re-parses an item from its current text, e.g. after it was detached.
    pub fn reevaluate(&mut self, id: ItemId) -> Result<(), ApplicationError>
    {
        let idx = self.index_of(id)?;
        let text = self.items[idx].raw_text.clone();
        let outcome = self.evaluate_text(idx, text);
        self.settle(&outcome.changed);
        outcome.error.map_or(Ok(()), Err)
    }

    /// Removes an item. Everything that transitively depended on its name is detached.
    pub fn delete(&mut self, id: ItemId) -> bool
    {
        let idx = match self.index_of(id)
        {
            Ok(idx) => idx,
            Err(_) => return false,
        };
        if let Some(name) = self.items[idx].parsed.as_ref().and_then(|p| p.defined_name()).map(str::to_owned)
        {
            self.delete_scope_sync(&name);
        }
        self.unregister(idx);
        self.items.remove(idx);
        log::debug!("deleted expression {}", id.0);
        true
    }

    pub fn set_focus(&mut self, id: ItemId, focused: bool) -> bool
    {
        match self.items.iter_mut().find(|item| item.id == id)
        {
            Some(item) => {
                item.focused = focused;
                true
            },
            None => false,
        }
    }

    pub fn settings_mut(&mut self, id: ItemId) -> Option<&mut ItemSettings>
    {
        self.items.iter_mut()
            .find(|item| item.id == id)
            .and_then(|item| item.settings.as_mut())
    }

    /// Parses `text` for the item at `idx` and installs the result.
    fn evaluate_text(&mut self, idx: usize, text: String) -> Outcome
    {
        let parsed = match &self.items[idx].registration
        {
            // the item's own current definition is not visible to its new text
            Some(reg) if !reg.key.starts_with('#') && self.context.scope.contains(&reg.key) => {
                let mut visible = self.context.scope.clone();
                visible.remove(&reg.key);
                parse(&text, &visible)
            },
            _ => parse(&text, &self.context.scope),
        };
        match parsed
        {
            Ok(parsed) => self.install(idx, parsed, text),
            Err(e) => Outcome { changed: self.fail(idx, e.clone()), error: Some(e) },
        }
    }

    fn install(&mut self, idx: usize, parsed: ParsedContent, text: String) -> Outcome
    {
        let id = self.items[idx].id;

        if let Some(name) = parsed.defined_name()
        {
            if let Some(owner) = self.owners.get(name).copied().filter(|owner| *owner != id)
            {
                let err = ApplicationError::semantic(format!("'{}' is already defined by expression {}", name, owner.0));
                return Outcome { changed: self.fail(idx, err.clone()), error: Some(err) };
            }

            if let Some(dep) = parsed.dependencies().iter().find(|dep| self.context.is_circular_reference(name, dep))
            {
                let err = ApplicationError::semantic(format!("'{}' cannot depend on '{}', which already depends on it", name, dep));
                log::debug!("rejected cyclic definition of '{}' through '{}'", name, dep);
                self.items[idx].status = ItemStatus::Failed(err.clone());
                self.touch(idx);
                return Outcome { changed: Vec::new(), error: Some(err) };
            }
        }

        let mut changed: Vec<String> = self.unregister(idx).into_iter().collect();

        let model = match &parsed
        {
            ParsedContent::Function(def) => match FnModel::build(def, &self.context.scope)
            {
                Ok(model) => Some(Rc::new(model)),
                Err(e) => {
                    let err = ApplicationError::semantic(format!("'{}' cannot be evaluated: {}", def.name, e));
                    self.fail(idx, err.clone());
                    return Outcome { changed, error: Some(err) };
                },
            },
            _ => None,
        };

        let item = &mut self.items[idx];
        item.kind = match &parsed
        {
            ParsedContent::Cleared => ItemKind::Empty,
            ParsedContent::Function(_) => ItemKind::Function,
            ParsedContent::Variable(_) => ItemKind::Variable,
            ParsedContent::Point(_) => ItemKind::Point,
        };
        match item.kind
        {
            ItemKind::Function | ItemKind::Point => {
                item.settings.get_or_insert_with(|| ItemSettings::for_index(id.0 as usize));
            },
            ItemKind::Variable | ItemKind::Empty => item.settings = None,
        }
        item.model = model;
        item.status = match parsed
        {
            ParsedContent::Cleared => ItemStatus::Empty,
            _ => ItemStatus::Ready,
        };

        if parsed != ParsedContent::Cleared
        {
            self.register(idx, &parsed, text);
        }
        if let Some(name) = parsed.defined_name()
        {
            if !changed.iter().any(|c| c == name)
            {
                changed.push(name.to_owned());
            }
        }
        self.items[idx].parsed = Some(parsed);
        self.touch(idx);
        Outcome { changed, error: None }
    }

    /// Drops the item's definition after an error. Returns the name it no longer defines.
    fn fail(&mut self, idx: usize, err: ApplicationError) -> Vec<String>
    {
        let old = self.unregister(idx);
        let item = &mut self.items[idx];
        item.parsed = None;
        item.model = None;
        item.status = if err.is_unresolved() { ItemStatus::Pending(err) } else { ItemStatus::Failed(err) };
        self.touch(idx);
        old.into_iter().collect()
    }

    fn register(&mut self, idx: usize, parsed: &ParsedContent, text: String)
    {
        let id = self.items[idx].id;
        let key = parsed.defined_name().map_or_else(|| anonymous_key(id), str::to_owned);
        let dependencies = parsed.dependencies().to_vec();
        self.context.add_dependencies(&key, &dependencies);
        if let Some(value) = parsed.to_scope_value(&text)
        {
            if self.context.scope.insert(&key, value)
            {
                self.owners.insert(key.clone(), id);
            }
        }
        self.items[idx].registration = Some(Registration { key, dependencies, text });
    }

    /// Removes the item's scope entry and edges. Returns the name it defined, if any.
    fn unregister(&mut self, idx: usize) -> Option<String>
    {
        let reg = self.items[idx].registration.take()?;
        self.context.remove_dependencies(&reg.key, &reg.dependencies);
        if reg.key.starts_with('#')
        {
            return None;
        }
        self.context.scope.remove(&reg.key);
        self.owners.remove(&reg.key);
        Some(reg.key)
    }

    fn settle(&mut self, changed: &[String])
    {
        if !changed.is_empty()
        {
            self.update_scope_sync(changed);
        }
        self.retry_pending();
    }

    /// Re-evaluates every transitive dependent of `changed` in breadth-first
    /// order. An item is held back while one of its own dependencies is
    /// still waiting in the queue, so it always sees fresh upstream values.
    fn update_scope_sync(&mut self, changed: &[String])
    {
        let mut order: Vec<String> = Vec::new();
        for name in changed
        {
            for key in self.context.graph.reachable_from(name)
            {
                if !order.contains(&key) && !changed.contains(&key)
                {
                    order.push(key);
                }
            }
        }

        let mut waiting: HashSet<String> = order.iter().cloned().collect();
        let mut queue: VecDeque<String> = order.into_iter().collect();
        let mut stalled = 0;
        while let Some(key) = queue.pop_front()
        {
            let idx = match self.item_for_key(&key)
            {
                Some(idx) => idx,
                None => {
                    waiting.remove(&key);
                    continue;
                },
            };
            let blocked = self.items[idx].registration.as_ref().map_or(false, |reg| {
                reg.dependencies.iter().any(|dep| *dep != key && waiting.contains(dep))
            });
            if blocked && stalled <= queue.len()
            {
                stalled += 1;
                queue.push_back(key);
                continue;
            }
            stalled = 0;
            waiting.remove(&key);

            log::trace!("re-evaluating '{}'", key);
            let text = match &self.items[idx].registration
            {
                Some(reg) => reg.text.clone(),
                None => self.items[idx].raw_text.clone(),
            };
            let outcome = self.evaluate_text(idx, text);
            if let Some(err) = outcome.error
            {
                log::debug!("'{}' failed after an upstream change: {}", key, err);
            }
        }
    }

    /// Retries pending items until a full pass resolves nothing new.
    fn retry_pending(&mut self)
    {
        let mut still_learning = true;
        let mut passes = 0;
        while still_learning && passes <= self.items.len()
        {
            still_learning = false;
            passes += 1;
            let pending: Vec<ItemId> = self.items.iter()
                .filter(|item| item.status.is_pending())
                .map(|item| item.id)
                .collect();
            for id in pending
            {
                let idx = match self.index_of(id)
                {
                    Ok(idx) => idx,
                    Err(_) => continue,
                };
                let text = self.items[idx].raw_text.clone();
                let outcome = self.evaluate_text(idx, text);
                if self.items[idx].status.is_ready()
                {
                    log::debug!("expression {} resolved", id.0);
                    still_learning = true;
                    if !outcome.changed.is_empty()
                    {
                        self.update_scope_sync(&outcome.changed);
                    }
                }
            }
        }
    }

    /// Removes `name` and everything depending on it from scope, detaching the dependents.
    fn delete_scope_sync(&mut self, name: &str)
    {
        let dependents = self.context.cascade_remove(name);
        for key in &dependents
        {
            if let Some(idx) = self.item_for_key(key)
            {
                self.unregister(idx);
                let item = &mut self.items[idx];
                item.parsed = None;
                item.model = None;
                item.status = ItemStatus::Detached;
                self.touch(idx);
                log::debug!("detached '{}' after deleting '{}'", key, name);
            }
        }
        self.owners.remove(name);
    }
}

#[cfg(test)]
fn document_with(lines: &[&str]) -> (Document, Vec<ItemId>)
{
    let mut doc = Document::new();
    let mut ids = Vec::new();
    for line in lines
    {
        let id = doc.insert();
        let _ = doc.set_text(id, line);
        ids.push(id);
    }
    (doc, ids)
}

#[test]
fn test_changes_propagate_to_dependents()
{
    let (mut doc, ids) = document_with(&["a = 1", "b = a + 1", "c = 2b"]);
    assert_eq!(doc.value_of("c"), Some(4.0));

    doc.set_text(ids[0], "a = 5").unwrap();
    assert_eq!(doc.value_of("b"), Some(6.0));
    assert_eq!(doc.value_of("c"), Some(12.0));
}

#[test]
fn test_diamond_sees_fresh_values()
{
    // d depends on a directly and through b and c
    let (mut doc, ids) = document_with(&["a = 1", "b = a", "c = b", "d = a + c"]);
    assert_eq!(doc.value_of("d"), Some(2.0));

    doc.set_text(ids[0], "a = 10").unwrap();
    assert_eq!(doc.value_of("d"), Some(20.0));
}

#[test]
fn test_pending_until_defined()
{
    let (mut doc, ids) = document_with(&["a = b"]);
    assert!(doc.item(ids[0]).unwrap().status().is_pending());
    assert_eq!(doc.value_of("a"), None);

    let b = doc.insert();
    doc.set_text(b, "b = 5").unwrap();
    assert!(doc.item(ids[0]).unwrap().status().is_ready());
    assert_eq!(doc.value_of("a"), Some(5.0));
}

#[test]
fn test_pending_chain_resolves_in_one_edit()
{
    let (mut doc, _) = document_with(&["c = b + 1", "b = a + 1"]);
    let a = doc.insert();
    doc.set_text(a, "a = 1").unwrap();
    assert_eq!(doc.value_of("c"), Some(3.0));
}

#[test]
fn test_cycle_is_rejected()
{
    let (mut doc, ids) = document_with(&["a = 1", "b = a + 1"]);
    let scope_before = doc.scope().clone();

    let err = doc.set_text(ids[0], "a = b").unwrap_err();
    assert!(err.message.contains("depends on it"));
    assert_eq!(doc.scope(), &scope_before);
    assert!(matches!(doc.item(ids[0]).unwrap().status(), ItemStatus::Failed(_)));
    assert_eq!(doc.value_of("b"), Some(2.0));
}

#[test]
fn test_cascading_delete_detaches()
{
    let (mut doc, ids) = document_with(&["s = 1", "t = s + 1", "y = t x"]);
    assert!(doc.delete(ids[0]));

    assert_eq!(doc.scope().len(), 0);
    assert_eq!(doc.item(ids[1]).unwrap().status(), &ItemStatus::Detached);
    assert_eq!(doc.item(ids[2]).unwrap().status(), &ItemStatus::Detached);
    assert!(doc.context().graph.is_empty());

    // redefining s does not bring t back on its own
    let s = doc.insert();
    doc.set_text(s, "s = 2").unwrap();
    assert_eq!(doc.item(ids[1]).unwrap().status(), &ItemStatus::Detached);
    assert_eq!(doc.value_of("t"), None);

    doc.reevaluate(ids[1]).unwrap();
    assert_eq!(doc.value_of("t"), Some(3.0));
}

#[test]
fn test_clearing_a_definition_leaves_dependents_pending()
{
    let (mut doc, ids) = document_with(&["a = 1", "b = 3a"]);
    doc.set_text(ids[0], "").unwrap();
    assert_eq!(doc.item(ids[0]).unwrap().status(), &ItemStatus::Empty);
    assert!(doc.item(ids[1]).unwrap().status().is_pending());

    doc.set_text(ids[0], "a = 2").unwrap();
    assert_eq!(doc.value_of("b"), Some(6.0));
}

#[test]
fn test_duplicate_definition_fails()
{
    let (mut doc, ids) = document_with(&["a = 1"]);
    let other = doc.insert();
    let err = doc.set_text(other, "a = 2").unwrap_err();
    assert!(err.message.contains("already defined"));
    assert_eq!(doc.value_of("a"), Some(1.0));
    assert!(doc.item(ids[0]).unwrap().status().is_ready());
}

#[test]
fn test_renaming_releases_the_old_name()
{
    let (mut doc, ids) = document_with(&["a = 1", "b = a + 1"]);
    doc.set_text(ids[0], "c = 7").unwrap();
    assert_eq!(doc.value_of("a"), None);
    assert_eq!(doc.value_of("c"), Some(7.0));
    assert!(doc.item(ids[1]).unwrap().status().is_pending());
}

#[test]
fn test_function_items_get_models_and_settings()
{
    let (doc, ids) = document_with(&["k = 2", "f(x) = k x^2", "(1, k)"]);
    let f = doc.item(ids[1]).unwrap();
    assert_eq!(f.kind(), ItemKind::Function);
    assert_eq!(f.model().unwrap().eval(3.0), 18.0);
    assert!(f.settings().is_some());

    let point = doc.item(ids[2]).unwrap();
    assert_eq!(point.kind(), ItemKind::Point);
    assert!(point.settings().is_some());

    assert!(doc.item(ids[0]).unwrap().settings().is_none());
}

#[test]
fn test_committed_definition_follows_upstream_changes()
{
    let (mut doc, ids) = document_with(&["k = 1", ""]);
    let parsed = parse("a = k + 1", doc.scope()).unwrap();
    doc.commit(ids[1], parsed).unwrap();
    assert_eq!(doc.value_of("a"), Some(2.0));
    assert_eq!(doc.item(ids[1]).unwrap().raw_text(), "a = k + 1");

    doc.set_text(ids[0], "k = 5").unwrap();
    assert_eq!(doc.value_of("a"), Some(6.0));
    assert!(doc.item(ids[1]).unwrap().status().is_ready());
}
