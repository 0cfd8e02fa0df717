//! Language adapter: answers classification predicates on tree-sitter node
//! type strings without the builders knowing any language. Each supported
//! language gets a static table; unknown/fuzzy node types fall back to
//! substring heuristics so the builders survive minor grammar drift.

use crate::model::language::LanguageKind;

/// Predicates a builder needs in order to interpret a CST event stream
/// generically (spec §4.1).
pub trait LanguageAdapter: Send + Sync {
    fn is_module(&self, type_name: &str) -> bool;
    fn is_class(&self, type_name: &str) -> bool;
    fn is_function(&self, type_name: &str) -> bool;
    fn is_param_list(&self, type_name: &str) -> bool;
    fn is_assign(&self, type_name: &str) -> bool;
    fn is_assign_target(&self, type_name: &str) -> bool;
    fn is_identifier_token(&self, type_name: &str) -> bool;
    fn is_string_token(&self, type_name: &str) -> bool;
    fn is_call(&self, type_name: &str) -> bool;
    fn is_decorator(&self, type_name: &str) -> bool;
    fn is_import(&self, type_name: &str) -> bool;
    fn is_export(&self, type_name: &str) -> bool;
    fn is_throw(&self, type_name: &str) -> bool;
    fn is_return(&self, type_name: &str) -> bool;
    fn is_if(&self, type_name: &str) -> bool;
    fn is_else(&self, type_name: &str) -> bool;
    fn is_while(&self, type_name: &str) -> bool;
    fn is_for(&self, type_name: &str) -> bool;
    fn is_try(&self, type_name: &str) -> bool;
    fn is_switch(&self, type_name: &str) -> bool;
    fn is_catch(&self, type_name: &str) -> bool;
    fn is_finally(&self, type_name: &str) -> bool;
    fn is_assignment_operator(&self, text: &str) -> bool;

    /// True for any of if/while/for/try/switch — "control construct".
    fn is_control(&self, type_name: &str) -> bool {
        self.is_if(type_name)
            || self.is_while(type_name)
            || self.is_for(type_name)
            || self.is_try(type_name)
            || self.is_switch(type_name)
    }
}

/// A static set of node-type strings plus a fuzzy fallback predicate.
struct Table {
    modules: &'static [&'static str],
    classes: &'static [&'static str],
    functions: &'static [&'static str],
    param_lists: &'static [&'static str],
    assigns: &'static [&'static str],
    assign_targets: &'static [&'static str],
    identifier_tokens: &'static [&'static str],
    string_tokens: &'static [&'static str],
    calls: &'static [&'static str],
    decorators: &'static [&'static str],
    imports: &'static [&'static str],
    exports: &'static [&'static str],
    throws: &'static [&'static str],
    returns: &'static [&'static str],
    ifs: &'static [&'static str],
    elses: &'static [&'static str],
    whiles: &'static [&'static str],
    fors: &'static [&'static str],
    tries: &'static [&'static str],
    switches: &'static [&'static str],
    catches: &'static [&'static str],
    finallys: &'static [&'static str],
    assignment_ops: &'static [&'static str],
}

fn contains(set: &[&str], needle: &str) -> bool {
    set.contains(&needle)
}

/// Fuzzy fallback: survives minor grammar renames by matching on substrings.
fn fuzzy_function(type_name: &str) -> bool {
    type_name.contains("function") && !type_name.contains("call")
}
fn fuzzy_class(type_name: &str) -> bool {
    type_name.contains("class") || type_name.contains("struct_item")
}
fn fuzzy_call(type_name: &str) -> bool {
    type_name.contains("call") && !type_name.contains("callback")
}
fn fuzzy_import(type_name: &str) -> bool {
    type_name.contains("import")
}

pub struct TableAdapter {
    table: &'static Table,
}

impl LanguageAdapter for TableAdapter {
    fn is_module(&self, t: &str) -> bool {
        contains(self.table.modules, t)
    }
    fn is_class(&self, t: &str) -> bool {
        contains(self.table.classes, t) || fuzzy_class(t)
    }
    fn is_function(&self, t: &str) -> bool {
        contains(self.table.functions, t) || fuzzy_function(t)
    }
    fn is_param_list(&self, t: &str) -> bool {
        contains(self.table.param_lists, t)
    }
    fn is_assign(&self, t: &str) -> bool {
        contains(self.table.assigns, t)
    }
    fn is_assign_target(&self, t: &str) -> bool {
        contains(self.table.assign_targets, t)
    }
    fn is_identifier_token(&self, t: &str) -> bool {
        contains(self.table.identifier_tokens, t)
    }
    fn is_string_token(&self, t: &str) -> bool {
        contains(self.table.string_tokens, t)
    }
    fn is_call(&self, t: &str) -> bool {
        contains(self.table.calls, t) || fuzzy_call(t)
    }
    fn is_decorator(&self, t: &str) -> bool {
        contains(self.table.decorators, t)
    }
    fn is_import(&self, t: &str) -> bool {
        contains(self.table.imports, t) || fuzzy_import(t)
    }
    fn is_export(&self, t: &str) -> bool {
        contains(self.table.exports, t)
    }
    fn is_throw(&self, t: &str) -> bool {
        contains(self.table.throws, t)
    }
    fn is_return(&self, t: &str) -> bool {
        contains(self.table.returns, t)
    }
    fn is_if(&self, t: &str) -> bool {
        contains(self.table.ifs, t)
    }
    fn is_else(&self, t: &str) -> bool {
        contains(self.table.elses, t)
    }
    fn is_while(&self, t: &str) -> bool {
        contains(self.table.whiles, t)
    }
    fn is_for(&self, t: &str) -> bool {
        contains(self.table.fors, t)
    }
    fn is_try(&self, t: &str) -> bool {
        contains(self.table.tries, t)
    }
    fn is_switch(&self, t: &str) -> bool {
        contains(self.table.switches, t)
    }
    fn is_catch(&self, t: &str) -> bool {
        contains(self.table.catches, t)
    }
    fn is_finally(&self, t: &str) -> bool {
        contains(self.table.finallys, t)
    }
    fn is_assignment_operator(&self, text: &str) -> bool {
        contains(self.table.assignment_ops, text)
    }
}

static PYTHON: Table = Table {
    modules: &["module"],
    classes: &["class_definition"],
    functions: &["function_definition", "lambda"],
    param_lists: &["parameters", "lambda_parameters"],
    assigns: &["assignment", "augmented_assignment"],
    assign_targets: &["left_hand_side"],
    identifier_tokens: &["identifier"],
    string_tokens: &["string", "string_content"],
    calls: &["call"],
    decorators: &["decorator"],
    imports: &["import_statement", "import_from_statement"],
    exports: &[],
    throws: &["raise_statement"],
    returns: &["return_statement"],
    ifs: &["if_statement"],
    elses: &["else_clause"],
    whiles: &["while_statement"],
    fors: &["for_statement"],
    tries: &["try_statement"],
    switches: &["match_statement"],
    catches: &["except_clause"],
    finallys: &["finally_clause"],
    assignment_ops: &["=", "+=", "-=", "*=", "/=", "//=", "%=", "**=", "&=", "|=", "^=", ">>=", "<<="],
};

static JAVASCRIPT: Table = Table {
    modules: &["program"],
    classes: &["class_declaration", "class"],
    functions: &["function_declaration", "function", "arrow_function", "method_definition"],
    param_lists: &["formal_parameters"],
    assigns: &["assignment_expression", "variable_declarator"],
    assign_targets: &[],
    identifier_tokens: &["identifier", "property_identifier", "shorthand_property_identifier"],
    string_tokens: &["string", "string_fragment", "template_string"],
    calls: &["call_expression"],
    decorators: &["decorator"],
    imports: &["import_statement"],
    exports: &["export_statement"],
    throws: &["throw_statement"],
    returns: &["return_statement"],
    ifs: &["if_statement"],
    elses: &["else_clause"],
    whiles: &["while_statement", "do_statement"],
    fors: &["for_statement", "for_in_statement"],
    tries: &["try_statement"],
    switches: &["switch_statement"],
    catches: &["catch_clause"],
    finallys: &["finally_clause"],
    assignment_ops: &["=", "+=", "-=", "*=", "/=", "%=", "**=", "&=", "|=", "^=", ">>=", "<<=", ">>>="],
};

static TYPESCRIPT: Table = Table {
    modules: &["program"],
    classes: &["class_declaration", "class", "interface_declaration"],
    functions: &[
        "function_declaration",
        "function",
        "arrow_function",
        "method_definition",
        "method_signature",
    ],
    param_lists: &["formal_parameters"],
    assigns: &["assignment_expression", "variable_declarator"],
    assign_targets: &[],
    identifier_tokens: &["identifier", "property_identifier", "shorthand_property_identifier", "type_identifier"],
    string_tokens: &["string", "string_fragment", "template_string"],
    calls: &["call_expression"],
    decorators: &["decorator"],
    imports: &["import_statement", "import_alias"],
    exports: &["export_statement"],
    throws: &["throw_statement"],
    returns: &["return_statement"],
    ifs: &["if_statement"],
    elses: &["else_clause"],
    whiles: &["while_statement", "do_statement"],
    fors: &["for_statement", "for_in_statement"],
    tries: &["try_statement"],
    switches: &["switch_statement"],
    catches: &["catch_clause"],
    finallys: &["finally_clause"],
    assignment_ops: &["=", "+=", "-=", "*=", "/=", "%=", "**=", "&=", "|=", "^=", ">>=", "<<=", ">>>="],
};

static RUST: Table = Table {
    modules: &["source_file", "mod_item"],
    classes: &["struct_item", "enum_item", "impl_item", "trait_item"],
    functions: &["function_item", "closure_expression"],
    param_lists: &["parameters", "closure_parameters"],
    assigns: &["assignment_expression", "let_declaration", "compound_assignment_expr"],
    assign_targets: &[],
    identifier_tokens: &["identifier", "field_identifier", "type_identifier"],
    string_tokens: &["string_literal", "raw_string_literal"],
    calls: &["call_expression", "macro_invocation"],
    decorators: &["attribute_item"],
    imports: &["use_declaration"],
    exports: &[],
    throws: &[],
    returns: &["return_expression"],
    ifs: &["if_expression", "if_let_expression"],
    elses: &[],
    whiles: &["while_expression", "while_let_expression"],
    fors: &["for_expression"],
    tries: &[],
    switches: &["match_expression"],
    catches: &[],
    finallys: &[],
    assignment_ops: &["=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", ">>=", "<<="],
};

/// Return the adapter for a language. Every variant has a table, even Dart
/// (which has no parser driver here) — downstream code that only needs
/// classification predicates (e.g. tests) still works uniformly.
pub fn for_language(lang: LanguageKind) -> Box<dyn LanguageAdapter> {
    let table: &'static Table = match lang {
        LanguageKind::Python => &PYTHON,
        LanguageKind::JavaScript => &JAVASCRIPT,
        LanguageKind::TypeScript => &TYPESCRIPT,
        LanguageKind::Rust => &RUST,
        LanguageKind::Dart => &RUST, // placeholder table; Dart has no driver
    };
    Box::new(TableAdapter { table })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_recognizes_function_and_call() {
        let a = for_language(LanguageKind::Python);
        assert!(a.is_function("function_definition"));
        assert!(a.is_call("call"));
        assert!(!a.is_call("function_definition"));
    }

    #[test]
    fn fuzzy_function_survives_grammar_drift() {
        let a = for_language(LanguageKind::JavaScript);
        assert!(a.is_function("some_new_function_node"));
    }

    #[test]
    fn assignment_operator_detection() {
        let a = for_language(LanguageKind::Python);
        assert!(a.is_assignment_operator("="));
        assert!(a.is_assignment_operator("+="));
        assert!(!a.is_assignment_operator("=="));
    }
}
