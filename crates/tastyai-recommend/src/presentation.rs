//! Localized markdown rendering of recommendations.

use std::fmt::Write;

use tastyai_core::{Language, UserPreferences};

use crate::orchestrator::{RecipeImage, Recommendation};

fn intro(language: Language) -> &'static str {
    match language {
        Language::English => "Based on your preferences, I recommend the following meals:",
        Language::Spanish => "Según tus preferencias, te recomiendo las siguientes comidas:",
        Language::Portuguese => "Com base nas suas preferências, recomendo as seguintes refeições:",
    }
}

fn ingredients_heading(language: Language) -> &'static str {
    match language {
        Language::English => "Ingredients",
        Language::Spanish | Language::Portuguese => "Ingredientes",
    }
}

fn directions_heading(language: Language) -> &'static str {
    match language {
        Language::English => "Directions",
        Language::Spanish => "Instrucciones",
        Language::Portuguese => "Instruções",
    }
}

fn image_caption(language: Language, title: &str) -> String {
    match language {
        Language::English => format!("AI-generated image of {title}"),
        Language::Spanish => format!("Imagen generada por IA de {title}"),
        Language::Portuguese => format!("Imagem gerada por IA de {title}"),
    }
}

fn image_unavailable(language: Language) -> &'static str {
    match language {
        Language::English => "Could not generate an image for this meal.",
        Language::Spanish => "No se pudo generar una imagen para esta comida.",
        Language::Portuguese => "Não foi possível gerar uma imagem para esta refeição.",
    }
}

/// Message shown when the request was not a recipe request.
pub fn ask_for_recipe(language: Language) -> &'static str {
    match language {
        Language::English => "Please ask for a recipe!",
        Language::Spanish => "¡Por favor, pide una receta!",
        Language::Portuguese => "Por favor, peça uma receita!",
    }
}

/// Message shown when nothing survived filtering.
pub fn no_results(language: Language) -> &'static str {
    match language {
        Language::English => "No meals matched your preferences.",
        Language::Spanish => "Ninguna comida coincide con tus preferencias.",
        Language::Portuguese => "Nenhuma refeição corresponde às suas preferências.",
    }
}

/// Reply to a request: a localized nudge when it was not a recipe request,
/// otherwise the rendered recommendations.
pub fn render_response(preferences: &UserPreferences, recommendations: &[Recommendation]) -> String {
    if !preferences.is_recipe_request {
        return format!("{}\n", ask_for_recipe(preferences.language));
    }
    render_markdown(recommendations, preferences.language)
}

/// Render recommendations as markdown using their translated fields.
pub fn render_markdown(recommendations: &[Recommendation], language: Language) -> String {
    let mut out = String::new();
    if recommendations.is_empty() {
        let _ = writeln!(out, "{}", no_results(language));
        return out;
    }

    let _ = writeln!(out, "### {}\n", intro(language));
    for rec in recommendations {
        let _ = writeln!(out, "#### {}\n", rec.translated_title);
        match &rec.image {
            RecipeImage::Generated(url) => {
                let caption = image_caption(language, &rec.translated_title);
                let _ = writeln!(out, "![{caption}]({url})\n");
            }
            RecipeImage::Unavailable => {
                let _ = writeln!(out, "_{}_\n", image_unavailable(language));
            }
            RecipeImage::NotRequested => {}
        }
        let _ = writeln!(out, "**{}:**\n", ingredients_heading(language));
        for ingredient in &rec.translated_ingredients {
            let _ = writeln!(out, "- {ingredient}");
        }
        let _ = writeln!(out, "\n**{}:**\n", directions_heading(language));
        for (i, step) in rec.translated_directions.iter().enumerate() {
            let _ = writeln!(out, "{}. {step}", i + 1);
        }
        out.push('\n');
    }
    out
}
