use std::error::Error;

use crate::core::providers::{find_builtin_provider, load_builtin_providers};

pub fn list_models(provider: Option<String>) -> Result<(), Box<dyn Error>> {
    match provider {
        Some(id) => {
            let provider = find_builtin_provider(&id)
                .ok_or_else(|| format!("Unknown provider '{id}'. Run 'causerie providers'."))?;
            println!("Models for {}:", provider.display_name);
            print_models(&provider.models);
        }
        None => {
            for provider in load_builtin_providers() {
                println!("{} ({}):", provider.display_name, provider.id);
                print_models(&provider.models);
            }
        }
    }
    Ok(())
}

fn print_models(models: &[String]) {
    for (index, model) in models.iter().enumerate() {
        if index == 0 {
            println!("  {model} (default)");
        } else {
            println!("  {model}");
        }
    }
}
