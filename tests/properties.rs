use proptest::prelude::*;
use xml_path_duplex as xpd;
use xpd::equality::{equals, node_hash};
use xpd::{compile, Context, Document};

#[derive(Debug, Clone)]
struct Tree {
    name: String,
    attrs: Vec<(String, String)>,
    text: String,
    kids: Vec<Tree>,
}

impl Tree {
    fn to_xml(&self, reverse_attrs: bool) -> String {
        let mut attrs = self.attrs.clone();
        if reverse_attrs {
            attrs.reverse();
        }
        let attrs: String = attrs.iter().map(|(k, v)| format!(" {k}=\"{v}\"")).collect();
        let kids: String = self.kids.iter().map(|k| k.to_xml(reverse_attrs)).collect();
        format!("<{n}{attrs}>{t}{kids}</{n}>", n = self.name, t = self.text)
    }
}

fn arb_tree() -> impl Strategy<Value = Tree> {
    let attrs = prop::collection::btree_map("[x-z]", "[a-z0-9]{0,3}", 0..3)
        .prop_map(|m| m.into_iter().collect::<Vec<_>>());
    let leaf = ("[a-c]", attrs.clone(), "[a-z0-9]{0,4}").prop_map(|(name, attrs, text)| Tree {
        name,
        attrs,
        text,
        kids: Vec::new(),
    });
    leaf.prop_recursive(3, 24, 4, move |inner| {
        ("[a-c]", attrs.clone(), prop::collection::vec(inner, 0..4)).prop_map(|(name, attrs, kids)| Tree {
            name,
            attrs,
            text: String::new(),
            kids,
        })
    })
}

prop_compose! {
    fn arb_relative_steps()(steps in prop::collection::vec("[a-c]", 1..5)) -> String {
        steps.join("/")
    }
}

proptest! {
    #[test]
    fn using_suffix_is_stripped(
        steps in arb_relative_steps(),
        quoted in proptest::bool::ANY,
        pattern in "[0#,.]{1,6}|yyyy-MM-dd|[A-Za-z]{1,8}",
    ) {
        let body = if quoted {
            format!("/r/{steps}[@k=' using x']")
        } else {
            format!("/r/{steps}")
        };
        let expr = compile(&format!("{body} using {pattern}")).unwrap();
        prop_assert_eq!(expr.stripped_text(), body.as_str());
        prop_assert_eq!(expr.format_pattern(), Some(pattern.as_str()));
    }

    #[test]
    fn independently_built_trees_are_structurally_equal(tree in arb_tree()) {
        let a = Document::parse_str(&tree.to_xml(false)).unwrap();
        let b = Document::parse_str(&tree.to_xml(true)).unwrap();
        let (ra, rb) = (a.document_element().unwrap(), b.document_element().unwrap());
        prop_assert!(equals(&a, ra, &b, rb));
        prop_assert!(equals(&a, ra, &a, ra));
        prop_assert_eq!(node_hash(&a, ra), node_hash(&b, rb));
    }

    #[test]
    fn ensure_existence_is_idempotent(steps in arb_relative_steps(), attr in proptest::option::of("[x-z]")) {
        let path = match &attr {
            Some(a) => format!("/r/{steps}/@{a}"),
            None => format!("/r/{steps}"),
        };
        let expr = compile(&path).unwrap();
        let ctx = Context::default();
        let mut doc = Document::parse_str("<r/>").unwrap();
        let root = doc.root();

        let first = xpd::ensure_existence(&expr, &mut doc, root, &ctx).unwrap();
        let snapshot = doc.clone();
        let second = xpd::ensure_existence(&expr, &mut doc, root, &ctx).unwrap();

        prop_assert_eq!(first, second);
        prop_assert_eq!(doc.to_xml(), snapshot.to_xml());
        prop_assert!(equals(&snapshot, first, &doc, second));
    }

    #[test]
    fn created_children_are_always_new(existing in 0usize..4) {
        let xml = format!("<a>{}</a>", "<b k=\"v\"/>".repeat(existing));
        let mut doc = Document::parse_str(&xml).unwrap();
        let a = doc.document_element().unwrap();
        let ctx = Context::default();
        let expr = compile("/a/b[@k='v']").unwrap();

        let before = xpd::evaluate_node_set(&expr, &doc, doc.root(), &ctx).unwrap();
        let created = xpd::create_child_with_predicate(&expr, &mut doc, a, &ctx).unwrap();
        let after = xpd::evaluate_node_set(&expr, &doc, doc.root(), &ctx).unwrap();

        prop_assert!(!before.contains(&created));
        prop_assert_eq!(after.len(), existing + 1);
        prop_assert_eq!(after.last().copied(), Some(created));
    }

    #[test]
    fn deleting_nothing_changes_nothing(tree in arb_tree()) {
        let mut doc = Document::parse_str(&tree.to_xml(false)).unwrap();
        let before = doc.to_xml();
        let root = doc.document_element().unwrap();
        let expr = compile("nothing").unwrap();
        xpd::delete_all_matching_children(&expr, &mut doc, root, &Context::default()).unwrap();
        prop_assert_eq!(doc.to_xml(), before);
    }
}
