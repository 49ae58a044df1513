//! Content records with on-demand deepening
//!
//! A [`Page`] starts out with whatever the server sent for the expansions it
//! was fetched with. Derived views are computed the first time they are asked
//! for and kept on the instance:
//!
//! - page properties need the rendered `body.view`; if it is missing the page
//!   is re-fetched once with `body.view` added to its expand set
//! - labels come from the label listing endpoint
//! - the space key is read from the `_expandable.space` link

use anyhow::Result;
use html_escape::decode_html_entities;
use serde_json::{Map, Value};
use tracing::debug;

use crate::api::ContentApi;
use crate::error::PageError;
use crate::expand::Expand;
use crate::properties::{self, ExtractOptions};

/// Expansion that carries the rendered page body
pub const BODY_VIEW: &str = "body.view";

/// Payload key the extracted properties are stored under
pub const PAGE_PROPERTIES: &str = "pageProperties";

/// A field name as seen by [`Page::get`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    PageProperties,
    Labels,
    SpaceKey,
    /// Plain key of the server payload
    Raw(&'a str),
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(name: &'a str) -> Self {
        match name {
            PAGE_PROPERTIES => Field::PageProperties,
            "labels" => Field::Labels,
            "spacekey" => Field::SpaceKey,
            other => Field::Raw(other),
        }
    }
}

/// Rendered view markup as sent by the server, before any unescaping
fn view_markup(data: &Value) -> Option<String> {
    data.pointer("/body/view/value")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Unescape the rich text body once, preferring `storage` over `view`
fn normalize_body(data: &mut Value) {
    let Some(body) = data.get_mut("body") else {
        return;
    };

    let representation = if body.get("storage").is_some() {
        "storage"
    } else if body.get("view").is_some() {
        "view"
    } else {
        return;
    };

    if let Some(Value::String(value)) = body
        .get_mut(representation)
        .and_then(|r| r.get_mut("value"))
    {
        *value = decode_html_entities(value.as_str()).into_owned();
    }
}

/// A fetched content record plus its lazily computed views
pub struct Page<'a, C: ContentApi + ?Sized> {
    api: &'a C,
    data: Value,
    /// Property tables are parsed from this, not from the unescaped body
    view_markup: Option<String>,
    expand: Expand,
    extract_options: ExtractOptions,
    properties: Option<Map<String, Value>>,
    labels: Option<Vec<String>>,
}

impl<'a, C: ContentApi + ?Sized> Page<'a, C> {
    /// Wrap a record that was fetched with `expand`
    pub fn new(api: &'a C, mut data: Value, expand: impl Into<Expand>) -> Self {
        let view_markup = view_markup(&data);
        normalize_body(&mut data);

        Self {
            api,
            data,
            view_markup,
            expand: expand.into(),
            extract_options: ExtractOptions::default(),
            properties: None,
            labels: None,
        }
    }

    /// Fetch a record by id and wrap it
    pub fn fetch(api: &'a C, id: &str, expand: impl Into<Expand>) -> Result<Self> {
        let expand = expand.into();
        let data = api.get_page(id, &expand)?;
        Ok(Self::new(api, data, expand))
    }

    /// Options passed to the property extractor on first properties access
    pub fn with_extract_options(mut self, options: ExtractOptions) -> Self {
        self.extract_options = options;
        self
    }

    pub fn id(&self) -> Result<String> {
        match self.data.get("id") {
            Some(Value::String(id)) => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(PageError::FieldNotFound("id".to_string()).into()),
        }
    }

    pub fn expand(&self) -> &Expand {
        &self.expand
    }

    /// The raw server payload
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Re-fetch the record with the tracked expand set, replacing the payload.
    /// Already extracted properties stay folded into the new payload.
    pub fn refresh(&mut self) -> Result<()> {
        let id = self.id()?;
        debug!(%id, expand = %self.expand, "refreshing page");

        let mut data = self.api.get_page(&id, &self.expand)?;
        self.view_markup = view_markup(&data);
        normalize_body(&mut data);
        if let (Some(properties), Value::Object(map)) = (&self.properties, &mut data) {
            map.insert(PAGE_PROPERTIES.to_string(), Value::Object(properties.clone()));
        }
        self.data = data;
        Ok(())
    }

    /// Look up a field: derived views first, then the raw payload
    pub fn get(&mut self, name: &str) -> Result<Value> {
        match Field::from(name) {
            Field::PageProperties => Ok(Value::Object(self.page_properties()?.clone())),
            Field::Labels => Ok(Value::from(self.labels()?.to_vec())),
            Field::SpaceKey => Ok(Value::String(self.space_key()?)),
            Field::Raw(key) => self
                .data
                .get(key)
                .cloned()
                .ok_or_else(|| PageError::FieldNotFound(key.to_string()).into()),
        }
    }

    /// Page properties, extracted from the rendered body on first access
    pub fn page_properties(&mut self) -> Result<&Map<String, Value>> {
        let properties = match self.properties.take() {
            Some(properties) => properties,
            None => {
                let properties = self.load_page_properties()?;
                if let Value::Object(map) = &mut self.data {
                    map.insert(PAGE_PROPERTIES.to_string(), Value::Object(properties.clone()));
                }
                properties
            }
        };
        Ok(&*self.properties.insert(properties))
    }

    /// Single page property, or `default` if the page does not define it
    pub fn page_property(&mut self, name: &str, default: impl Into<Value>) -> Result<Value> {
        Ok(self
            .page_properties()?
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.into()))
    }

    /// `(key, value)` pairs of the page properties, limited to `names`
    /// unless it is empty
    pub fn page_properties_filtered<'p, S: AsRef<str>>(
        &'p mut self,
        names: &'p [S],
    ) -> Result<impl Iterator<Item = (&'p str, &'p Value)> + 'p> {
        let properties = self.page_properties()?;
        Ok(properties
            .iter()
            .filter(move |(key, _)| {
                names.is_empty() || names.iter().any(|name| name.as_ref() == key.as_str())
            })
            .map(|(key, value)| (key.as_str(), value)))
    }

    /// Label names, listed from the server on first access
    pub fn labels(&mut self) -> Result<&[String]> {
        let labels = match self.labels.take() {
            Some(labels) => labels,
            None => {
                let id = self.id()?;
                debug!(%id, "listing labels");
                let result = self.api.get_labels(&id)?;
                result
                    .get("results")
                    .and_then(Value::as_array)
                    .map(|results| {
                        results
                            .iter()
                            .filter_map(|label| label.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default()
            }
        };
        Ok(self.labels.insert(labels).as_slice())
    }

    /// Space key from the `_expandable.space` link, e.g.
    /// `/rest/api/space/DOC` -> `DOC`
    pub fn space_key(&self) -> Result<String> {
        self.data
            .pointer("/_expandable/space")
            .and_then(Value::as_str)
            .and_then(|link| link.rsplit('/').next())
            .map(str::to_string)
            .ok_or_else(|| PageError::FieldNotFound("spacekey".to_string()).into())
    }

    /// New mapping of the given fields; the whole payload if `keys` is empty
    pub fn to_mapping(&mut self, keys: &[&str]) -> Result<Value> {
        if keys.is_empty() {
            return Ok(self.data.clone());
        }

        let mut result = Map::new();
        for key in keys {
            let value = self.get(key)?;
            result.insert(key.to_string(), value);
        }
        Ok(Value::Object(result))
    }

    fn load_page_properties(&mut self) -> Result<Map<String, Value>> {
        if !self.expand.contains(BODY_VIEW) {
            self.expand.insert(BODY_VIEW);
            if let Err(e) = self.refresh() {
                self.expand.remove(BODY_VIEW);
                return Err(e);
            }
        }

        let html = self
            .view_markup
            .as_deref()
            .ok_or_else(|| PageError::FieldNotFound(BODY_VIEW.to_string()))?;

        properties::extract(html, &self.extract_options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    const VIEW: &str = r#"<div class="plugin-tabmeta-details"><table><tbody>
<tr><th>Owner</th><td>Kiwi</td></tr>
<tr><th>Status</th><td>Draft</td></tr>
<tr><th>Team</th><td>Docs</td></tr>
</tbody></table></div>"#;

    #[derive(Default)]
    struct FakeApi {
        page_calls: Cell<usize>,
        label_calls: Cell<usize>,
        last_expand: RefCell<Expand>,
    }

    fn record() -> Value {
        json!({
            "id": "42",
            "title": "Release notes",
            "_expandable": {"space": "/rest/api/space/DOC"}
        })
    }

    impl ContentApi for FakeApi {
        fn get_page(&self, _id: &str, expand: &Expand) -> Result<Value> {
            self.page_calls.set(self.page_calls.get() + 1);
            *self.last_expand.borrow_mut() = expand.clone();

            let mut page = record();
            if expand.contains(BODY_VIEW) {
                page["body"] = json!({"view": {"value": VIEW}});
            }
            Ok(page)
        }

        fn get_labels(&self, _id: &str) -> Result<Value> {
            self.label_calls.set(self.label_calls.get() + 1);
            Ok(json!({"results": [{"name": "draft"}, {"name": "release"}]}))
        }
    }

    struct BrokenApi;

    impl ContentApi for BrokenApi {
        fn get_page(&self, _id: &str, _expand: &Expand) -> Result<Value> {
            bail!("connection refused")
        }

        fn get_labels(&self, _id: &str) -> Result<Value> {
            bail!("connection refused")
        }
    }

    fn is_field_not_found(err: &anyhow::Error, name: &str) -> bool {
        matches!(
            err.downcast_ref::<PageError>(),
            Some(PageError::FieldNotFound(key)) if key == name
        )
    }

    #[test]
    fn test_properties_refresh_once() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, record(), Expand::new());

        let props = page.page_properties().unwrap();
        assert_eq!(props["Owner"], "Kiwi");
        assert_eq!(api.page_calls.get(), 1);
        assert!(page.expand().contains(BODY_VIEW));
        assert!(api.last_expand.borrow().contains(BODY_VIEW));

        page.page_properties().unwrap();
        page.get("pageProperties").unwrap();
        page.page_property("Status", "").unwrap();
        assert_eq!(api.page_calls.get(), 1);
    }

    #[test]
    fn test_properties_without_refresh_when_view_present() {
        let api = FakeApi::default();
        let mut data = record();
        data["body"] = json!({"view": {"value": VIEW}});
        let mut page = Page::new(&api, data, "body.view");

        assert_eq!(page.page_property("Team", "").unwrap(), "Docs");
        assert_eq!(api.page_calls.get(), 0);
    }

    #[test]
    fn test_properties_folded_into_payload() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, record(), "version");

        page.get("pageProperties").unwrap();

        assert_eq!(page.data()[PAGE_PROPERTIES]["Status"], "Draft");
        assert!(page.expand().contains("version"));
        // raw payload fields survive the refresh
        assert_eq!(page.get("title").unwrap(), "Release notes");
    }

    #[test]
    fn test_properties_with_escaped_markup_in_values() {
        let api = FakeApi::default();
        let mut data = record();
        data["body"] = json!({"view": {"value": concat!(
            r#"<div class="plugin-tabmeta-details"><table><tbody>"#,
            "<tr><th>Rule</th><td>a &lt; b &amp;&amp; c &gt; d</td></tr>",
            "<tr><th>Owner</th><td>Kiwi</td></tr>",
            "</tbody></table></div>"
        )}});
        let mut page = Page::new(&api, data, "body.view");

        assert_eq!(page.page_property("Rule", "").unwrap(), "a < b && c > d");
        assert_eq!(page.page_property("Owner", "").unwrap(), "Kiwi");
        assert_eq!(api.page_calls.get(), 0);
        // the payload body is still unescaped for display
        assert!(page.data()["body"]["view"]["value"]
            .as_str()
            .unwrap()
            .contains("a < b"));
    }

    #[test]
    fn test_refresh_keeps_properties_in_payload() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, record(), Expand::new());

        page.page_properties().unwrap();
        page.refresh().unwrap();

        assert_eq!(api.page_calls.get(), 2);
        assert_eq!(page.data()[PAGE_PROPERTIES]["Owner"], "Kiwi");
        assert_eq!(page.to_mapping(&[]).unwrap()[PAGE_PROPERTIES]["Team"], "Docs");
    }

    #[test]
    fn test_soft_and_hard_lookup() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, record(), Expand::new());

        assert_eq!(page.page_property("missing", "x").unwrap(), "x");

        let err = page.get("missing").unwrap_err();
        assert!(is_field_not_found(&err, "missing"));
    }

    #[test]
    fn test_spacekey_independent_of_expansions() {
        let api = FakeApi::default();
        let page = Page::new(&api, record(), "body.storage,version,ancestors");

        assert_eq!(page.space_key().unwrap(), "DOC");
        assert_eq!(api.page_calls.get(), 0);

        let mut page = Page::new(&api, record(), Expand::new());
        assert_eq!(page.get("spacekey").unwrap(), "DOC");
    }

    #[test]
    fn test_spacekey_missing() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, json!({"id": "1"}), Expand::new());

        let err = page.get("spacekey").unwrap_err();
        assert!(is_field_not_found(&err, "spacekey"));
    }

    #[test]
    fn test_labels_listed_once() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, record(), Expand::new());

        assert_eq!(page.labels().unwrap(), ["draft", "release"]);
        assert_eq!(page.get("labels").unwrap(), json!(["draft", "release"]));
        assert_eq!(api.label_calls.get(), 1);
        assert_eq!(api.page_calls.get(), 0);
    }

    #[test]
    fn test_filtered_properties() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, record(), Expand::new());

        let all: Vec<&str> = page
            .page_properties_filtered::<&str>(&[])
            .unwrap()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(all, vec!["Owner", "Status", "Team"]);

        let some: Vec<(&str, &Value)> = page
            .page_properties_filtered(&["Team", "Nope"])
            .unwrap()
            .collect();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].0, "Team");
        assert_eq!(some[0].1, "Docs");
    }

    #[test]
    fn test_storage_body_unescaped_on_construction() {
        let api = FakeApi::default();
        let mut data = record();
        data["body"] = json!({
            "storage": {"value": "&lt;p&gt;Fish &amp; chips&lt;/p&gt;"},
            "view": {"value": "&lt;p&gt;untouched&lt;/p&gt;"}
        });
        let page = Page::new(&api, data, "body.storage,body.view");

        assert_eq!(page.data()["body"]["storage"]["value"], "<p>Fish & chips</p>");
        assert_eq!(page.data()["body"]["view"]["value"], "&lt;p&gt;untouched&lt;/p&gt;");
    }

    #[test]
    fn test_view_body_unescaped_without_storage() {
        let api = FakeApi::default();
        let mut data = record();
        data["body"] = json!({"view": {"value": "caf&eacute;"}});
        let page = Page::new(&api, data, "body.view");

        assert_eq!(page.data()["body"]["view"]["value"], "café");
    }

    #[test]
    fn test_failed_refresh_is_not_remembered() {
        let api = BrokenApi;
        let mut page = Page::new(&api, record(), Expand::new());

        assert!(page.page_properties().is_err());
        assert!(!page.expand().contains(BODY_VIEW));
    }

    #[test]
    fn test_to_mapping() {
        let api = FakeApi::default();
        let mut page = Page::new(&api, record(), Expand::new());

        let mapping = page.to_mapping(&["title", "spacekey"]).unwrap();
        assert_eq!(mapping, json!({"title": "Release notes", "spacekey": "DOC"}));

        assert_eq!(page.to_mapping(&[]).unwrap(), record());
        assert!(page.to_mapping(&["nope"]).is_err());
    }

    #[test]
    fn test_fetch_uses_expand() {
        let api = FakeApi::default();
        let page = Page::fetch(&api, "42", "body.view").unwrap();

        assert_eq!(api.page_calls.get(), 1);
        assert_eq!(page.id().unwrap(), "42");
        assert!(page.data()["body"]["view"]["value"].is_string());
    }

    #[test]
    fn test_field_dispatch() {
        assert_eq!(Field::from("pageProperties"), Field::PageProperties);
        assert_eq!(Field::from("labels"), Field::Labels);
        assert_eq!(Field::from("spacekey"), Field::SpaceKey);
        assert_eq!(Field::from("title"), Field::Raw("title"));
    }
}
