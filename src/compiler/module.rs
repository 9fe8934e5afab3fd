//! Compilation units and the read-only context shared by every top-level binding
//! of one module.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::ir::{Expr, Ident, ModuleName, Qualified};

/// One strongly connected group of top-level bindings. `recursive` is set when
/// the members refer to each other (or a single member to itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingGroup {
    #[serde(default)]
    pub recursive: bool,
    pub bindings: Vec<(Ident, Expr)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub ident: Ident,
    /// Name the binding is exported under, when different from `ident`.
    #[serde(default)]
    pub public_name: Option<Ident>,
    /// Re-export from another module.
    #[serde(default)]
    pub module: Option<ModuleName>,
}

/// Input of the backend: one module, already optimized and grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    pub name: ModuleName,
    #[serde(default)]
    pub imports: Vec<ModuleName>,
    /// Bindings provided by the module's `foreign.js`.
    #[serde(default)]
    pub foreign: Vec<Ident>,
    #[serde(default)]
    pub groups: Vec<BindingGroup>,
    #[serde(default)]
    pub exports: Vec<Export>,
}

pub const FOREIGN_ALIAS: &str = "$foreign";
pub const FOREIGN_PATH: &str = "./foreign.js";

/// JS namespace alias of an imported module: `Data.Maybe` becomes `Data$dMaybe`.
pub fn module_alias(name: &ModuleName) -> String {
    name.0.replace('.', "$d")
}

pub fn module_path(name: &ModuleName) -> String {
    format!("../{}/index.js", name)
}

#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub name: ModuleName,
    /// Lower recursive groups that qualify as loops.
    pub tco: bool,
    foreign: HashSet<Ident>,
    reserved: Vec<String>,
    /// Dispatcher of each mutually recursive top-level group, keyed by its first member.
    dispatchers: HashMap<Ident, String>,
}

impl ModuleContext {
    pub fn new(unit: &CompilationUnit, tco: bool) -> Self {
        let mut reserved = vec![FOREIGN_ALIAS.to_string()];
        reserved.extend(unit.imports.iter().map(module_alias));
        reserved.extend(unit.foreign.iter().map(|ident| ident.to_string()));
        reserved.extend(
            unit.groups
                .iter()
                .flat_map(|group| group.bindings.iter())
                .map(|(ident, _)| ident.to_string()),
        );

        let mut taken = reserved.iter().cloned().collect::<HashSet<_>>();
        let mut dispatchers = HashMap::new();
        for group in &unit.groups {
            let Some((first, _)) = group.bindings.first() else {
                continue;
            };
            if !group.recursive || group.bindings.len() < 2 {
                continue;
            }
            let base = format!(
                "${}",
                group
                    .bindings
                    .iter()
                    .map(|(ident, _)| ident.as_str())
                    .collect::<Vec<_>>()
                    .join("_")
            );
            let mut label = base.clone();
            let mut suffix = 0;
            while taken.contains(&label) {
                suffix += 1;
                label = format!("{}${}", base, suffix);
            }
            taken.insert(label.clone());
            reserved.push(label.clone());
            dispatchers.insert(first.clone(), label);
        }

        Self {
            name: unit.name.clone(),
            tco,
            foreign: unit.foreign.iter().cloned().collect(),
            reserved,
            dispatchers,
        }
    }

    /// Module-scope name of the loop shared by the group whose first member is `first`.
    pub fn dispatcher_label(&self, first: &Ident) -> Option<&str> {
        self.dispatchers.get(first).map(String::as_str)
    }

    /// Names already taken at module scope. Locals never reuse them.
    pub fn reserved_names(&self) -> &[String] {
        &self.reserved
    }

    pub fn is_foreign(&self, ident: &Ident) -> bool {
        self.foreign.contains(ident)
    }

    /// True when `name` refers to a binding of this module.
    pub fn is_local(&self, name: &Qualified) -> bool {
        name.module.as_ref().map_or(true, |module| *module == self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::make_int;

    fn unit() -> CompilationUnit {
        CompilationUnit {
            name: ModuleName::from("Main"),
            imports: vec![ModuleName::from("Data.Maybe")],
            foreign: vec![Ident::from("log")],
            groups: vec![BindingGroup {
                recursive: false,
                bindings: vec![(Ident::from("main"), make_int(0))],
            }],
            exports: vec![],
        }
    }

    #[test]
    fn aliases_replace_dots() {
        assert_eq!(module_alias(&ModuleName::from("Data.Maybe")), "Data$dMaybe");
        assert_eq!(module_path(&ModuleName::from("Data.Maybe")), "../Data.Maybe/index.js");
    }

    #[test]
    fn context_reserves_module_scope_names() {
        let context = ModuleContext::new(&unit(), true);
        let reserved = context.reserved_names();
        for name in ["$foreign", "Data$dMaybe", "log", "main"] {
            assert!(reserved.iter().any(|r| r == name), "{} should be reserved", name);
        }
        assert!(context.is_foreign(&Ident::from("log")));
        assert!(context.is_local(&Qualified::new("Main", "main")));
        assert!(!context.is_local(&Qualified::new("Data.Maybe", "fromMaybe")));
    }

    #[test]
    fn dispatcher_labels_are_unique_and_reserved() {
        let pair = |x: &str, y: &str| BindingGroup {
            recursive: true,
            bindings: vec![(Ident::from(x), make_int(0)), (Ident::from(y), make_int(1))],
        };
        let mut unit = unit();
        unit.groups.push(pair("a_b", "c"));
        unit.groups.push(pair("a", "b_c"));
        unit.groups.push(BindingGroup {
            recursive: true,
            bindings: vec![(Ident::from("go"), make_int(0))],
        });

        let context = ModuleContext::new(&unit, true);
        assert_eq!(context.dispatcher_label(&Ident::from("a_b")), Some("$a_b_c"));
        assert_eq!(context.dispatcher_label(&Ident::from("a")), Some("$a_b_c$1"));
        assert_eq!(context.dispatcher_label(&Ident::from("go")), None);
        assert_eq!(context.dispatcher_label(&Ident::from("main")), None);
        for label in ["$a_b_c", "$a_b_c$1"] {
            assert!(context.reserved_names().iter().any(|r| r == label));
        }
    }

    #[test]
    fn unit_loads_from_json() {
        let source = r#"{
            "name": "Main",
            "groups": [
                { "bindings": [["answer", { "Lit": { "Int": 42 } }]] }
            ]
        }"#;
        let unit: CompilationUnit = serde_json::from_str(source).unwrap();
        assert_eq!(unit.groups.len(), 1);
        assert!(!unit.groups[0].recursive);
        assert_eq!(unit.groups[0].bindings[0].1, make_int(42));
    }
}
