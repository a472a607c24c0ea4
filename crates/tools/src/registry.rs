//! Static tool registry
//!
//! Three tools are exposed to the model. Their schemas are fixed at compile
//! time; the registry is built once and shared read-only by every session.

use once_cell::sync::Lazy;

use voice_shopper_core::{InputSchema, PropertyKind, PropertySchema, ToolSpec};

/// Tool name constants
pub mod names {
    pub const SEARCH_PRODUCTS: &str = "search_products";
    pub const SAVE_ITEM: &str = "save_item";
    pub const GET_USER_PREFERENCES: &str = "get_user_preferences";
}

static REGISTRY: Lazy<ToolRegistry> = Lazy::new(ToolRegistry::with_default_tools);

/// The process-wide registry
pub fn registry() -> &'static ToolRegistry {
    &REGISTRY
}

/// Read-only collection of registered tools
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    /// Build the default shopping tool set
    pub fn with_default_tools() -> Self {
        let tools = vec![
            ToolSpec {
                name: names::SEARCH_PRODUCTS,
                description: "Search for products based on user's query and preferences. \
                    Use this when the user asks to find, search for, or show them products.",
                schema: InputSchema {
                    properties: &[
                        PropertySchema {
                            name: "query",
                            kind: PropertyKind::String,
                            description: "The search query for products (e.g., 'laptop for \
                                programming', 'ergonomic office chair')",
                        },
                        PropertySchema {
                            name: "min_price",
                            kind: PropertyKind::Number,
                            description: "Minimum price in USD (optional)",
                        },
                        PropertySchema {
                            name: "max_price",
                            kind: PropertyKind::Number,
                            description: "Maximum price in USD (optional)",
                        },
                        PropertySchema {
                            name: "brands",
                            kind: PropertyKind::StringArray,
                            description: "Preferred brands (optional)",
                        },
                        PropertySchema {
                            name: "categories",
                            kind: PropertyKind::StringArray,
                            description: "Product categories (optional)",
                        },
                    ],
                    required: &["query"],
                },
            },
            ToolSpec {
                name: names::SAVE_ITEM,
                description: "Save a product to the user's saved items list. Use this when \
                    the user asks to save, remember, or add a product to their list.",
                schema: InputSchema {
                    properties: &[
                        PropertySchema {
                            name: "product_id",
                            kind: PropertyKind::String,
                            description: "Unique identifier for the product",
                        },
                        PropertySchema {
                            name: "product_name",
                            kind: PropertyKind::String,
                            description: "Name of the product",
                        },
                        PropertySchema {
                            name: "description",
                            kind: PropertyKind::String,
                            description: "Product description (optional)",
                        },
                        PropertySchema {
                            name: "price",
                            kind: PropertyKind::Number,
                            description: "Product price (optional)",
                        },
                    ],
                    required: &["product_id", "product_name"],
                },
            },
            ToolSpec {
                name: names::GET_USER_PREFERENCES,
                description: "Get the user's saved shopping preferences. Use this to \
                    personalize recommendations.",
                schema: InputSchema {
                    properties: &[],
                    required: &[],
                },
            },
        ];

        Self { tools }
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All tool names
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }

    /// Function-calling definitions for the model
    pub fn definitions(&self) -> Vec<serde_json::Value> {
        self.tools.iter().map(|t| t.definition_json()).collect()
    }
}
