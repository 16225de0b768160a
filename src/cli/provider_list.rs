use crate::core::providers::load_builtin_providers;

pub fn list_providers() {
    println!("Available providers:");
    for provider in load_builtin_providers() {
        println!(
            "  {} - {} ({})",
            provider.id, provider.display_name, provider.base_url
        );
    }
}
