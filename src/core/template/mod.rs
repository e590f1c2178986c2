pub mod api_model_entity;
pub mod api_model_loader;
pub mod external_tool_template_builder;
pub mod library_template_builder;
pub mod template_builder_trait;
pub mod template_documents;
