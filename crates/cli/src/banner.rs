//! Startup banner listing the connected server and its tools.

use runtime::Catalog;

/// One `- **name**: summary` line per tool.
pub fn tool_list(catalog: &Catalog) -> String {
    if catalog.is_empty() {
        return "- No tools available".to_string();
    }
    catalog
        .iter()
        .map(|proxy| {
            let summary = proxy.descriptor().summary_line().replace('|', "-");
            let summary = match summary.trim() {
                "" => "No description",
                summary => summary,
            };
            format!("- **{}**: {summary}", proxy.name())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn banner(endpoint: &str, catalog: &Catalog) -> String {
    format!(
        "Connected: {endpoint}\n\nAvailable tools ({}):\n{}",
        catalog.len(),
        tool_list(catalog)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{Bridge, Lifecycle};
    use std::sync::Arc;

    fn tool(name: &str, description: Option<&str>) -> runtime::Tool {
        runtime::Tool {
            name: name.into(),
            description: description.map(str::to_string),
            input_schema: Default::default(),
        }
    }

    fn catalog(tools: Vec<runtime::Tool>) -> Catalog {
        let bridge = Bridge::builder(Arc::new(Lifecycle::new())).build();
        Catalog::build(tools, &bridge)
    }

    #[test]
    fn lists_first_line_with_pipes_replaced() {
        let catalog = catalog(vec![
            tool("search_books", Some("Search by title | author\n\nArgs: query")),
            tool("browse", None),
            tool("blank", Some("\nsecond line only")),
        ]);

        assert_eq!(
            banner("http://localhost:8000/sse", &catalog),
            "Connected: http://localhost:8000/sse\n\n\
             Available tools (3):\n\
             - **search_books**: Search by title - author\n\
             - **browse**: Tool: browse\n\
             - **blank**: No description"
        );
    }

    #[test]
    fn empty_catalog_says_so() {
        assert_eq!(tool_list(&catalog(vec![])), "- No tools available");
    }
}
