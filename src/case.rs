//! Naming conventions: entity names to table, foreign-key and junction names.

/// Convert a single identifier to snake_case.
/// e.g. "BlogPost" -> "blog_post", "user-profile" -> "user_profile"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.chars() {
        if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Default table for an entity: "user" -> "users", "BlogPost" -> "blog_posts".
pub fn default_table_name(entity: &str) -> String {
    format!("{}s", to_snake_case(entity))
}

/// Column other tables use to reference `entity`'s key column: ("user", "id") -> "user_id".
pub fn default_foreign_key_column(entity: &str, key_column: &str) -> String {
    format!("{}_{}", to_snake_case(entity), key_column)
}

/// Junction between two entities: the snake_case names sorted and joined, e.g. "article_tag".
pub fn default_junction_table(a: &str, b: &str) -> String {
    let mut names = [to_snake_case(a), to_snake_case(b)];
    names.sort();
    names.join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_cases_entity_names() {
        assert_eq!(to_snake_case("user"), "user");
        assert_eq!(to_snake_case("BlogPost"), "blog_post");
        assert_eq!(to_snake_case("user-profile"), "user_profile");
        assert_eq!(to_snake_case("HTTPLog"), "httplog");
    }

    #[test]
    fn derives_conventional_names() {
        assert_eq!(default_table_name("BlogPost"), "blog_posts");
        assert_eq!(default_foreign_key_column("user", "id"), "user_id");
        assert_eq!(default_junction_table("tag", "article"), "article_tag");
        assert_eq!(default_junction_table("article", "tag"), "article_tag");
    }
}
