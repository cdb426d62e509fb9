//! Normalización de nombres de ejecutivo a claves de hoja.

use crate::models::AgentKey;

/// Canonicaliza un nombre libre: `"juan  PÉREZ"` → `Juan_Perez`.
///
/// Separa por espacios y guiones bajos, pliega tildes, descarta todo lo que
/// no sea `[A-Za-z0-9]`, capitaliza cada token y los une con `_`.
/// Nunca falla: una entrada sin caracteres válidos produce una clave vacía
/// que el llamador debe rechazar.
pub fn normalize(raw_name: &str) -> AgentKey {
    let tokens: Vec<String> = raw_name
        .split(|c: char| c.is_whitespace() || c == '_')
        .map(clean_token)
        .filter(|t| !t.is_empty())
        .map(|t| title_case(&t))
        .collect();

    AgentKey(tokens.join("_"))
}

/// Busca la hoja existente de un ejecutivo: primero por nombre exacto, luego con
/// espacios en lugar de guiones bajos y por último normalizando el nombre guardado
/// (cubre diferencias de mayúsculas y espaciado).
pub fn match_existing_partition<'a, I>(key: &AgentKey, known_names: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = known_names.into_iter().collect();
    if key.is_empty() {
        return None;
    }

    if let Some(name) = names.iter().find(|n| **n == key.as_str()) {
        return Some(name.to_string());
    }

    let spaced = key.as_str().replace('_', " ");
    if let Some(name) = names.iter().find(|n| **n == spaced) {
        return Some(name.to_string());
    }

    names
        .iter()
        .find(|n| normalize(n) == *key)
        .map(|n| n.to_string())
}

fn clean_token(token: &str) -> String {
    token
        .chars()
        .map(fold_accent)
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(token.len());
            out.push(first.to_ascii_uppercase());
            out.push_str(&chars.as_str().to_ascii_lowercase());
            out
        }
        None => String::new(),
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_spacing_and_accents() {
        assert_eq!(normalize("Juan Pérez").as_str(), "Juan_Perez");
        assert_eq!(normalize("juan PEREZ").as_str(), "Juan_Perez");
        assert_eq!(normalize("  juan   perez ").as_str(), "Juan_Perez");
        assert_eq!(normalize("JUAN_PEREZ").as_str(), "Juan_Perez");
        assert_eq!(normalize("María José Núñez").as_str(), "Maria_Jose_Nunez");
    }

    #[test]
    fn strips_symbols_and_keeps_digits() {
        assert_eq!(normalize("Ana-María (turno 2)").as_str(), "Anamaria_Turno_2");
        assert_eq!(normalize("agente 07").as_str(), "Agente_07");
    }

    #[test]
    fn garbage_yields_empty_key() {
        assert!(normalize("").is_empty());
        assert!(normalize("  --  ").is_empty());
    }

    #[test]
    fn display_form_round_trips() {
        let key = normalize("juan PEREZ");
        assert_eq!(normalize(&key.display_name()), key);
        assert_eq!(normalize(&"Juan_Perez".replace('_', " ")), key);
    }

    #[test]
    fn matches_exact_spaced_and_case_variants() {
        let key = normalize("Juan Perez");
        assert_eq!(
            match_existing_partition(&key, ["RESUMEN", "Juan_Perez"]),
            Some("Juan_Perez".to_string())
        );
        assert_eq!(
            match_existing_partition(&key, ["Juan Perez"]),
            Some("Juan Perez".to_string())
        );
        assert_eq!(
            match_existing_partition(&key, ["JUAN PEREZ"]),
            Some("JUAN PEREZ".to_string())
        );
        assert_eq!(match_existing_partition(&key, ["Ana_Diaz"]), None);
    }

    #[test]
    fn exact_match_wins_over_variants() {
        let key = normalize("juan perez");
        assert_eq!(
            match_existing_partition(&key, ["juan perez", "Juan_Perez"]),
            Some("Juan_Perez".to_string())
        );
    }
}
