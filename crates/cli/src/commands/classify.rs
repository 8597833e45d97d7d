//! `tessera classify`: show what a given prompt count maps to.

use tessera_core::bracket::{BracketClassifier, Classification};

pub fn run(prompt_count: f64, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let classification = BracketClassifier::default().classify_lenient(prompt_count);
    if json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
    } else {
        print!("{}", render(&classification));
    }
    Ok(())
}

pub fn render(c: &Classification) -> String {
    let layers: Vec<String> = c.active_layers.iter().map(|l| l.to_string()).collect();
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    format!(
        "  Bracket:       {}\n  Context left:  {:.1}%\n  Tokens used:   {}\n  Token budget:  {}\n  Layers:        {}\n  Memory hints:  {}\n  Handoff:       {}\n",
        c.bracket,
        c.context_percent,
        c.tokens_used,
        c.token_budget,
        layers.join(", "),
        yes_no(c.memory_hints_enabled),
        yes_no(c.handoff_warning),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_for_depleted() {
        let c = BracketClassifier::default().classify(75);
        let out = render(&c);
        assert!(out.contains("Bracket:       DEPLETED"));
        assert!(out.contains("Context left:  32.5%"));
        assert!(out.contains("Memory hints:  yes"));
        assert!(out.contains("Handoff:       no"));
    }

    #[test]
    fn fresh_lists_four_layers() {
        let c = BracketClassifier::default().classify_lenient(-3.0);
        let out = render(&c);
        assert!(out.contains("L0 constitution, L1 global, L2 agent, L7 star-command"));
    }
}
