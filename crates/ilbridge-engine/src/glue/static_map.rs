//! Static map loading
//!
//! The AOT compiler describes the nodes it generated as
//!
//! ```xml
//! <ObjectNodes>
//!   <Type Name="App.Program">
//!     <Node Name="__GetGCStaticBase_App_Program" Length="16" />
//!   </Type>
//! </ObjectNodes>
//! ```
//!
//! Only the `Name` of each `Node` matters here.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::GlueError;

const ROOT: &[u8] = b"ObjectNodes";
const NODE: &[u8] = b"Node";

/// Names of every `Node` element, in document order
pub fn parse_static_map(xml: &str) -> Result<Vec<String>, GlueError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut seen_root = false;
    let mut names = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                if !seen_root {
                    if e.name().as_ref() != ROOT {
                        return Err(GlueError::MalformedMap(format!(
                            "root element is '{}', expected 'ObjectNodes'",
                            String::from_utf8_lossy(e.name().as_ref())
                        )));
                    }
                    seen_root = true;
                } else if e.name().as_ref() == NODE {
                    names.push(node_name(&e, names.len())?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_root {
        return Err(GlueError::MalformedMap("no root element".to_string()));
    }
    Ok(names)
}

fn node_name(e: &BytesStart<'_>, index: usize) -> Result<String, GlueError> {
    let attr = e
        .try_get_attribute("Name")
        .map_err(quick_xml::Error::from)?
        .ok_or_else(|| GlueError::MalformedMap(format!("Node #{} has no Name attribute", index)))?;
    Ok(attr.unescape_value()?.into_owned())
}
